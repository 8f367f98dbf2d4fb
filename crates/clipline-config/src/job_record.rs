//! `job.json`'s wire schema (§6) and its conversion into the validated
//! `clipline_core::Job` domain type.
//!
//! This is the "single validated record type" the §9 redesign note asks for:
//! the wire format stays a flat, serde-friendly struct (matching the schema
//! bit-for-bit so external tooling that only writes `job.json` keeps
//! working), while `config_overrides` is the one place arbitrary/unknown
//! keys are allowed to live, exactly as `PipelineConfig::extra` handles them
//! for the pipeline-defaults layer.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clipline_core::{ClipWindow, FeatureFlags, Job, JobId, LogLevel, Workflow};

use crate::error::ConfigError;
use crate::time::parse_clip_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaProcessingMode {
    Full,
    Clip,
}

/// The exact on-disk shape of `job.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub workflow: Workflow,
    pub input_media: PathBuf,
    pub source_language: String,
    #[serde(default)]
    pub target_languages: Vec<String>,
    pub media_processing_mode: MediaProcessingMode,
    /// Raw `HH:MM:SS[.mmm]` / `SS.mmm` text, or `null`. An explicit empty
    /// string is accepted on the wire and normalized to `None` here (§4.1) —
    /// this is what lets "process full media" and "process a zero-length
    /// clip" stay distinguishable.
    #[serde(default)]
    pub media_start_time: Option<String>,
    #[serde(default)]
    pub media_end_time: Option<String>,
    #[serde(default)]
    pub two_step_transcription: bool,
    #[serde(default)]
    pub source_separation: bool,
    #[serde(default)]
    pub voice_activity_detection: bool,
    #[serde(default)]
    pub multi_pass_refinement: bool,
    #[serde(default)]
    pub speaker_aware_bias: bool,
    #[serde(default)]
    pub lyrics_detection: bool,
    #[serde(default)]
    pub log_level: LogLevel,
    pub created_at: DateTime<Utc>,
    /// Pipeline-config overrides embedded in the job record (§4.1 middle
    /// precedence tier). Arbitrary keys; unrecognized ones are retained
    /// verbatim rather than silently accepted or rejected.
    #[serde(default)]
    pub config_overrides: BTreeMap<String, serde_json::Value>,
}

fn normalize_empty(raw: &Option<String>) -> Option<&str> {
    match raw {
        Some(s) if s.is_empty() => None,
        Some(s) => Some(s.as_str()),
        None => None,
    }
}

impl JobRecord {
    /// Build the validated domain `Job`, parsing clip timestamps and
    /// enforcing the cross-field invariants from §3.
    pub fn into_job(self) -> Result<Job, ConfigError> {
        let start = normalize_empty(&self.media_start_time);
        let end = normalize_empty(&self.media_end_time);

        let clip_window = match (self.media_processing_mode, start, end) {
            (MediaProcessingMode::Full, _, _) => None,
            (MediaProcessingMode::Clip, Some(s), Some(e)) => {
                let start_seconds = parse_clip_timestamp("media_start_time", s)?;
                let end_seconds = parse_clip_timestamp("media_end_time", e)?;
                Some(ClipWindow::new(start_seconds, end_seconds)?)
            }
            (MediaProcessingMode::Clip, _, _) => {
                return Err(ConfigError::MissingField(
                    "media_start_time/media_end_time required for clip mode".to_string(),
                ));
            }
        };

        let job = Job {
            job_id: self
                .job_id
                .parse::<JobId>()
                .expect("JobId parsing is infallible"),
            workflow: self.workflow,
            input_media: self.input_media,
            source_language: self.source_language,
            target_languages: self.target_languages,
            clip_window,
            feature_flags: FeatureFlags {
                source_separation: self.source_separation,
                voice_activity_detection: self.voice_activity_detection,
                multi_pass_refinement: self.multi_pass_refinement,
                speaker_aware_bias: self.speaker_aware_bias,
                lyrics_detection: self.lyrics_detection,
                two_step_transcription: self.two_step_transcription,
            },
            log_level: self.log_level,
            created_at: self.created_at,
        };

        job.validate()?;
        Ok(job)
    }
}
