//! Error type shared by the Job Allocator, Workflow Planner, and Pipeline Orchestrator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The allocator tried every sequence number up to its configured ceiling.
    #[error("resource exhausted: no free job sequence under {0}")]
    ResourceExhausted(std::path::PathBuf),

    #[error("job {0} was cancelled")]
    Cancelled(String),

    #[error(transparent)]
    Domain(#[from] clipline_core::Error),

    #[error(transparent)]
    Config(#[from] clipline_config::ConfigError),

    #[error(transparent)]
    Env(#[from] clipline_env::Error),

    #[error(transparent)]
    StageIo(#[from] clipline_stageio::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
