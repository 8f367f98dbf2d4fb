//! The dual logger (§4.5): every record goes to the stage's own `stage.log`;
//! records at INFO and above also go to the shared pipeline log so an
//! operator can `tail` one file across the whole job.
//!
//! Routing is deliberately not left to a `tracing` subscriber alone: a stage
//! runs as its own process and may or may not have one installed, but the
//! on-disk log contract has to hold either way. Each record is still mirrored
//! through `tracing`'s macros so a subscriber installed by the stage binary's
//! `main` sees the same events.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::Result;
use crate::line_writer::LineLockedWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn label(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

pub struct StageLogger {
    stage_name: String,
    stage_log: Mutex<File>,
    shared_log: Option<Arc<LineLockedWriter>>,
}

impl StageLogger {
    /// `shared_log_path` comes from the `PIPELINE_LOG_PATH` environment
    /// variable the Environment Manager sets when launching a stage
    /// subprocess (§4.4); stages run outside that contract (e.g. in tests)
    /// pass `None` and get a stage-local log only.
    pub fn new(
        stage_name: impl Into<String>,
        stage_dir: &Path,
        shared_log_path: Option<&Path>,
    ) -> Result<Self> {
        let stage_log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(stage_dir.join("stage.log"))?;

        let shared_log = shared_log_path
            .map(LineLockedWriter::open)
            .transpose()?
            .map(Arc::new);

        Ok(Self {
            stage_name: stage_name.into(),
            stage_log: Mutex::new(stage_log),
            shared_log,
        })
    }

    fn format(&self, level: Level, message: &str) -> String {
        format!(
            "{} [{:>5}] {}: {}\n",
            Utc::now().to_rfc3339(),
            level.label(),
            self.stage_name,
            message
        )
    }

    pub fn log(&self, level: Level, message: &str) {
        let line = self.format(level, message);

        if let Ok(mut f) = self.stage_log.lock() {
            let _ = f.write_all(line.as_bytes());
            let _ = f.flush();
        }

        if level >= Level::Info {
            if let Some(shared) = &self.shared_log {
                let _ = shared.write_line(&line);
            }
        }

        match level {
            Level::Debug => tracing::debug!(stage = %self.stage_name, "{message}"),
            Level::Info => tracing::info!(stage = %self.stage_name, "{message}"),
            Level::Warn => tracing::warn!(stage = %self.stage_name, "{message}"),
            Level::Error => tracing::error!(stage = %self.stage_name, "{message}"),
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}
