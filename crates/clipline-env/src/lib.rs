//! The Environment Manager (C4): resolves a stage's required environment,
//! exports the shared cache-root block, and launches the stage module as an
//! isolated child process.

pub mod error;
pub mod launcher;
pub mod manager;
pub mod resolve;
pub mod routing;

pub use error::{Error, Result};
pub use launcher::{LaunchSpec, StageLauncher, SubprocessLauncher, cache_root_env};
pub use manager::EnvironmentManager;
pub use resolve::{LanguagePair, resolve_environment};
pub use routing::{route_asr_environment, route_translation_environment};
