//! `PipelineConfig` (§4.1): the single validated record type every stage
//! consults instead of a free-form open dictionary (§9). Recognized fields
//! are enumerated below; anything else encountered during merge lands in
//! `extra`, auditable but never promoted to a typed field.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clipline_core::LogLevel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Mps,
    Auto,
}

impl Default for ComputeDevice {
    fn default() -> Self {
        ComputeDevice::Auto
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputePrecision {
    Int8,
    Float16,
    Float32,
}

impl Default for ComputePrecision {
    fn default() -> Self {
        ComputePrecision::Float16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasStrategy {
    Global,
    Windowed,
    Hybrid,
}

impl Default for BiasStrategy {
    fn default() -> Self {
        BiasStrategy::Hybrid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrConfig {
    pub model_id: String,
    pub device: ComputeDevice,
    pub precision: ComputePrecision,
    pub batch_size: u32,
    pub beam_width: u32,
    pub best_of: u32,
    pub temperature_schedule: Vec<f64>,
    pub no_speech_threshold: f64,
    pub logprob_threshold: f64,
    pub compression_ratio_threshold: f64,
    pub condition_on_previous: bool,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            model_id: "large-v3".to_string(),
            device: ComputeDevice::Auto,
            precision: ComputePrecision::Float16,
            batch_size: 8,
            beam_width: 5,
            best_of: 5,
            temperature_schedule: vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0],
            no_speech_threshold: 0.6,
            logprob_threshold: -1.0,
            compression_ratio_threshold: 2.4,
            condition_on_previous: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasConfig {
    pub strategy: BiasStrategy,
    pub window: u32,
    pub stride: u32,
    pub top_k: u32,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            strategy: BiasStrategy::Hybrid,
            window: 30,
            stride: 15,
            top_k: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AntiHallucinationConfig {
    pub max_repeated_ngram: u32,
    pub repetition_penalty: f64,
}

impl Default for AntiHallucinationConfig {
    fn default() -> Self {
        Self {
            max_repeated_ngram: 3,
            repetition_penalty: 1.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VadConfig {
    pub onset: f64,
    pub offset: f64,
    pub merge_gap_seconds: f64,
    pub min_speech_duration_seconds: f64,
    pub min_silence_duration_seconds: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            onset: 0.5,
            offset: 0.35,
            merge_gap_seconds: 0.2,
            min_speech_duration_seconds: 0.25,
            min_silence_duration_seconds: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiarizationConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LyricsDetectionConfig {
    pub threshold: f64,
}

impl Default for LyricsDetectionConfig {
    fn default() -> Self {
        Self { threshold: 0.7 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiPassConfig {
    pub threshold: f64,
    pub max_iterations: u32,
    pub beam_increment: u32,
}

impl Default for MultiPassConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            max_iterations: 3,
            beam_increment: 2,
        }
    }
}

/// Immutable after `resolve()` returns: there are no setters, only a builder
/// consumed during merge (§4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub asr: AsrConfig,
    pub bias: BiasConfig,
    pub anti_hallucination: AntiHallucinationConfig,
    pub vad: VadConfig,
    pub diarization: DiarizationConfig,
    pub lyrics_detection: LyricsDetectionConfig,
    pub multi_pass: MultiPassConfig,
    pub log_level: LogLevel,
    /// Model cache roots keyed by framework name (`"whisperx"`, `"mlx"`,
    /// `"demucs"`, `"pyannote"`, `"indictrans2"`, `"nllb"`, ...), all rooted
    /// under a single project-local cache directory per §4.4.
    pub cache_roots: BTreeMap<String, PathBuf>,
    /// Unrecognized keys encountered during merge, retained for manifest
    /// snapshots (§4.1, §9) but never read by call sites that only look at
    /// the typed fields above.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let project_cache_root = PathBuf::from(".cache");
        let mut cache_roots = BTreeMap::new();
        for framework in ["whisperx", "mlx", "demucs", "pyannote", "indictrans2", "nllb"] {
            cache_roots.insert(framework.to_string(), project_cache_root.join(framework));
        }
        Self {
            asr: AsrConfig::default(),
            bias: BiasConfig::default(),
            anti_hallucination: AntiHallucinationConfig::default(),
            vad: VadConfig::default(),
            diarization: DiarizationConfig::default(),
            lyrics_detection: LyricsDetectionConfig::default(),
            multi_pass: MultiPassConfig::default(),
            log_level: LogLevel::Info,
            cache_roots,
            extra: BTreeMap::new(),
        }
    }
}
