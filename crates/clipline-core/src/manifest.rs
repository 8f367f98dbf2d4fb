//! Manifest types (§3): the structured JSON records that give the pipeline
//! complete data lineage. `StageManifest` is authored by `clipline-stageio`;
//! `JobManifest` is authored by the orchestrator in `clipline-scheduler`.
//! Both live here because both are serde types other crates need to agree on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Status of a single stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Running,
    Success,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageStatus::Running)
    }
}

/// A file the stage has declared as an input, output, or intermediate.
/// `kind` is a free-text type tag (`"audio"`, `"transcript"`, `"subtitle"`,
/// `"model"`, ...) intentionally not an enum: the registry of possible kinds
/// grows with stages that are out of scope for this core (§1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedFile {
    pub kind: String,
    pub path: PathBuf,
    pub size_bytes: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TrackedFile {
    pub fn new(kind: impl Into<String>, path: PathBuf) -> Self {
        Self {
            kind: kind.into(),
            path,
            size_bytes: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// A file produced inside a stage directory that is not a declared output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntermediateFile {
    pub path: PathBuf,
    pub retained: bool,
    pub reason: String,
}

/// A single error encountered during stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    /// Language-neutral error-kind tag (§7), e.g. `"StageMissingInput"`.
    pub kind: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// A single warning encountered during stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningRecord {
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Optional resource-usage block; stages that don't report usage simply omit it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_seconds: Option<f64>,
    pub max_rss_bytes: Option<u64>,
    pub gpu_seconds: Option<f64>,
}

/// One stage execution's manifest, stored at `<stage dir>/manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageManifest {
    pub stage_name: String,
    pub stage_number: u32,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub status: StageStatus,
    pub inputs: Vec<TrackedFile>,
    pub outputs: Vec<TrackedFile>,
    pub intermediates: Vec<IntermediateFile>,
    /// Configuration keys relevant to this stage, resolved at stage start.
    /// Unknown config keys are retained here (§4.1) even though they never
    /// become typed fields on `PipelineConfig`.
    pub config_snapshot: serde_json::Value,
    pub resource_usage: Option<ResourceUsage>,
    pub errors: Vec<ErrorRecord>,
    pub warnings: Vec<WarningRecord>,
}

impl StageManifest {
    pub fn new(stage_name: impl Into<String>, stage_number: u32) -> Self {
        Self {
            stage_name: stage_name.into(),
            stage_number,
            start_timestamp: Utc::now(),
            end_timestamp: None,
            duration_seconds: None,
            status: StageStatus::Running,
            inputs: Vec::new(),
            outputs: Vec::new(),
            intermediates: Vec::new(),
            config_snapshot: serde_json::Value::Null,
            resource_usage: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// The terminal status of an entire job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Success,
    Partial,
    Failed,
}

/// A per-stage line item in the aggregate job manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage_name: String,
    pub status: StageStatus,
    pub duration_seconds: Option<f64>,
    pub manifest_path: PathBuf,
    /// Set when an optional stage failed and the job kept going (§4.6e).
    pub warning: Option<String>,
}

/// The aggregate job manifest, stored at `<job dir>/manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobManifest {
    pub job_id: String,
    pub workflow: String,
    pub stages: Vec<StageSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub terminal_status: Option<TerminalStatus>,
}

impl JobManifest {
    pub fn new(job_id: impl Into<String>, workflow: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            workflow: workflow.into(),
            stages: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            terminal_status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trips_through_json() {
        let mut m = StageManifest::new("asr", 6);
        m.outputs
            .push(TrackedFile::new("transcript", "06_asr/transcript.json".into()));
        m.status = StageStatus::Success;
        m.end_timestamp = Some(Utc::now());

        let json = serde_json::to_string(&m).unwrap();
        let back: StageManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stage_name, m.stage_name);
        assert_eq!(back.outputs.len(), 1);
        assert_eq!(back.status, StageStatus::Success);
    }

    #[test]
    fn fresh_manifest_starts_running() {
        let m = StageManifest::new("demux", 1);
        assert_eq!(m.status, StageStatus::Running);
        assert!(!m.status.is_terminal());
    }
}
