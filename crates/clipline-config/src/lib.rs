//! The Configuration Resolver (C1) for the clipline media pipeline.
//!
//! Parses pipeline-defaults KDL, the job record's embedded overrides, and
//! runtime environment overrides into one immutable `PipelineConfig`.

pub mod error;
pub mod job_record;
pub mod kdl_layer;
pub mod pipeline_config;
pub mod resolver;
pub mod time;

pub use error::{ConfigError, ConfigResult};
pub use job_record::{JobRecord, MediaProcessingMode};
pub use pipeline_config::{
    AntiHallucinationConfig, AsrConfig, BiasConfig, BiasStrategy, ComputeDevice, ComputePrecision,
    DiarizationConfig, LyricsDetectionConfig, MultiPassConfig, PipelineConfig, VadConfig,
};
pub use resolver::{RawLayer, env_layer_from_strings, resolve};
