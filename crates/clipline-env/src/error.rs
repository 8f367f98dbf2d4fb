//! Error type for the Environment Manager.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no dependency tree registered for environment {0:?}")]
    UnknownEnvironment(String),

    #[error(transparent)]
    Domain(#[from] clipline_core::Error),

    #[error("failed to launch stage process: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
