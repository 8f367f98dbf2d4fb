//! Job definition: the top-level unit of work the pipeline executes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::JobId;
use crate::{Error, Result};

/// The user-chosen end goal; determines which stages the Workflow Planner selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    Transcribe,
    Translate,
    Subtitle,
}

impl Workflow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Workflow::Transcribe => "transcribe",
            Workflow::Translate => "translate",
            Workflow::Subtitle => "subtitle",
        }
    }

    /// Whether this workflow requires at least one target language.
    pub fn requires_targets(&self) -> bool {
        matches!(self, Workflow::Translate | Workflow::Subtitle)
    }

    /// Whether this workflow's pipeline ends in a muxed container.
    pub fn produces_mux(&self) -> bool {
        matches!(self, Workflow::Subtitle)
    }
}

/// A clip window, in source-media time. `start < end` is enforced at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipWindow {
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl ClipWindow {
    pub fn new(start_seconds: f64, end_seconds: f64) -> Result<Self> {
        if !(start_seconds < end_seconds) {
            return Err(Error::InvalidInput(format!(
                "clip window start ({start_seconds}) must be less than end ({end_seconds})"
            )));
        }
        Ok(Self {
            start_seconds,
            end_seconds,
        })
    }

    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

/// Feature flags that alter which optional stages run and how.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub source_separation: bool,
    pub voice_activity_detection: bool,
    pub multi_pass_refinement: bool,
    pub speaker_aware_bias: bool,
    pub lyrics_detection: bool,
    pub two_step_transcription: bool,
}

/// Log verbosity, mirrored into every stage's environment block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl LogLevel {
    pub fn as_tracing_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// One invocation of the pipeline for one input media file.
///
/// Immutable after creation except for the orchestrator appending per-stage
/// summaries (tracked separately in `JobManifest`, not on this type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub workflow: Workflow,
    pub input_media: std::path::PathBuf,
    pub source_language: String,
    pub target_languages: Vec<String>,
    pub clip_window: Option<ClipWindow>,
    pub feature_flags: FeatureFlags,
    pub log_level: LogLevel,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Validate the cross-field invariants from the data model (§3).
    ///
    /// Per-field invariants (e.g. `start < end`) are enforced by the field's
    /// own constructor (`ClipWindow::new`); this only checks relationships
    /// between fields that a constructor can't see in isolation.
    pub fn validate(&self) -> Result<()> {
        if self.workflow.requires_targets() && self.target_languages.is_empty() {
            return Err(Error::InvalidInput(format!(
                "workflow {:?} requires at least one target language",
                self.workflow
            )));
        }
        if self
            .target_languages
            .iter()
            .any(|t| t == &self.source_language)
        {
            return Err(Error::InvalidInput(
                "target languages must not include the source language".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_job() -> Job {
        Job {
            job_id: JobId::new(chrono::Utc::now().date_naive(), "acme", 1),
            workflow: Workflow::Transcribe,
            input_media: "/media/in.mp4".into(),
            source_language: "hi".to_string(),
            target_languages: vec![],
            clip_window: None,
            feature_flags: FeatureFlags::default(),
            log_level: LogLevel::Info,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn transcribe_without_targets_is_valid() {
        assert!(base_job().validate().is_ok());
    }

    #[test]
    fn translate_without_targets_is_invalid() {
        let mut job = base_job();
        job.workflow = Workflow::Translate;
        assert!(job.validate().is_err());
    }

    #[test]
    fn target_equal_to_source_is_invalid() {
        let mut job = base_job();
        job.workflow = Workflow::Translate;
        job.target_languages = vec!["hi".to_string()];
        assert!(job.validate().is_err());
    }

    #[test]
    fn clip_window_rejects_start_ge_end() {
        assert!(ClipWindow::new(10.0, 10.0).is_err());
        assert!(ClipWindow::new(20.0, 10.0).is_err());
        assert!(ClipWindow::new(5.0, 10.0).is_ok());
    }
}
