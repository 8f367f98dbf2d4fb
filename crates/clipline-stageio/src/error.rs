//! Error type for the StageIO facade.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("path escapes stage directory: {0}")]
    PathEscapesStageDirectory(PathBuf),

    #[error("input not found: {0}")]
    MissingInput(PathBuf),

    #[error("stage contract violation: {0}")]
    ContractViolation(String),

    #[error(transparent)]
    Domain(#[from] clipline_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
