//! `StageIo`: the single facade a stage binary uses to resolve its input and
//! output paths, log, and author its manifest (§4.4, §4.5). One instance is
//! constructed per stage process and consumed by `finalize`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use clipline_core::{StageManifest, StageStatus, TrackedFile, registry};

use crate::error::{Error, Result};
use crate::logger::StageLogger;
use crate::paths::join_within;

pub struct StageIo {
    stage_name: String,
    job_dir: PathBuf,
    stage_dir: PathBuf,
    logger: StageLogger,
    manifest: Mutex<StageManifest>,
}

impl StageIo {
    /// Create the stage's directory if absent and open its logger and
    /// manifest. `shared_log_path` is normally `std::env::var("PIPELINE_LOG_PATH")`,
    /// forwarded by the caller so this crate stays free of env lookups.
    pub fn new(stage_name: &str, job_dir: &Path, shared_log_path: Option<&Path>) -> Result<Self> {
        let descriptor = registry::stage(stage_name)?;
        let stage_dir = job_dir.join(descriptor.directory_name());
        fs::create_dir_all(&stage_dir)?;

        let logger = StageLogger::new(stage_name, &stage_dir, shared_log_path)?;
        let manifest = Mutex::new(StageManifest::new(stage_name, descriptor.number));

        Ok(Self {
            stage_name: stage_name.to_string(),
            job_dir: job_dir.to_path_buf(),
            stage_dir,
            logger,
            manifest,
        })
    }

    pub fn stage_dir(&self) -> &Path {
        &self.stage_dir
    }

    pub fn logger(&self) -> &StageLogger {
        &self.logger
    }

    /// Resolve an input file produced by an earlier stage. Defaults to the
    /// stage immediately preceding this one in the registry when
    /// `from_stage` is `None`.
    pub fn get_input_path(&self, name: &str, from_stage: Option<&str>) -> Result<PathBuf> {
        let upstream_dir = match from_stage {
            Some(stage) => registry::stage_directory(stage)?,
            None => registry::preceding_stage(&self.stage_name)?
                .ok_or_else(|| {
                    Error::ContractViolation(format!(
                        "{} has no preceding stage and no from_stage was given",
                        self.stage_name
                    ))
                })?
                .directory_name(),
        };

        let path = join_within(&self.job_dir.join(upstream_dir), name)?;
        if !path.exists() {
            return Err(Error::MissingInput(path));
        }
        Ok(path)
    }

    /// Resolve a path this stage is allowed to write to, inside its own
    /// stage directory.
    pub fn get_output_path(&self, name: &str) -> Result<PathBuf> {
        join_within(&self.stage_dir, name)
    }

    fn relative_to_job(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.job_dir).unwrap_or(path).to_path_buf()
    }

    /// Repeated calls for the same `path` replace the earlier entry rather
    /// than accumulating duplicates, so an iterative writer can re-track
    /// after truncating and rewriting a file (§4.5).
    pub fn track_input(&self, kind: impl Into<String>, path: &Path) {
        let relative = self.relative_to_job(path);
        let mut manifest = self.manifest.lock().expect("manifest mutex poisoned");
        manifest.inputs.retain(|tracked| tracked.path != relative);
        manifest.inputs.push(TrackedFile::new(kind, relative));
    }

    /// Repeated calls for the same `path` replace the earlier entry rather
    /// than accumulating duplicates (§4.5).
    pub fn track_output(&self, kind: impl Into<String>, path: &Path) {
        let relative = self.relative_to_job(path);
        let mut manifest = self.manifest.lock().expect("manifest mutex poisoned");
        manifest.outputs.retain(|tracked| tracked.path != relative);
        manifest.outputs.push(TrackedFile::new(kind, relative));
    }

    pub fn track_intermediate(&self, path: &Path, retained: bool, reason: impl Into<String>) {
        let relative = self.relative_to_job(path);
        let mut manifest = self.manifest.lock().expect("manifest mutex poisoned");
        manifest.intermediates.push(clipline_core::IntermediateFile {
            path: relative,
            retained,
            reason: reason.into(),
        });
    }

    pub fn set_config(&self, value: serde_json::Value) {
        let mut manifest = self.manifest.lock().expect("manifest mutex poisoned");
        manifest.config_snapshot = value;
    }

    pub fn add_config(&self, key: impl Into<String>, value: serde_json::Value) {
        let mut manifest = self.manifest.lock().expect("manifest mutex poisoned");
        if !manifest.config_snapshot.is_object() {
            manifest.config_snapshot = serde_json::Value::Object(serde_json::Map::new());
        }
        manifest
            .config_snapshot
            .as_object_mut()
            .expect("just ensured object")
            .insert(key.into(), value);
    }

    pub fn add_warning(&self, message: impl Into<String>) {
        let message = message.into();
        self.logger.warn(&message);
        let mut manifest = self.manifest.lock().expect("manifest mutex poisoned");
        manifest.warnings.push(clipline_core::WarningRecord {
            message,
            occurred_at: Utc::now(),
        });
    }

    pub fn add_error(&self, message: impl Into<String>, kind: Option<&str>) {
        let message = message.into();
        self.logger.error(&message);
        let mut manifest = self.manifest.lock().expect("manifest mutex poisoned");
        manifest.errors.push(clipline_core::ErrorRecord {
            message,
            kind: kind.map(str::to_string),
            occurred_at: Utc::now(),
        });
    }

    /// Stamp timing, re-stat every tracked file's size, and write
    /// `manifest.json` atomically via temp-file-plus-rename. Consumes
    /// `self`: a stage calls this exactly once, as its last action.
    pub fn finalize(self, status: StageStatus) -> Result<StageManifest> {
        let mut manifest = self.manifest.into_inner().expect("manifest mutex poisoned");

        let end = Utc::now();
        manifest.duration_seconds =
            Some((end - manifest.start_timestamp).num_milliseconds() as f64 / 1000.0);
        manifest.end_timestamp = Some(end);
        manifest.status = status;

        for tracked in manifest.inputs.iter_mut().chain(manifest.outputs.iter_mut()) {
            let absolute = self.job_dir.join(&tracked.path);
            tracked.size_bytes = fs::metadata(&absolute).ok().map(|m| m.len());
        }

        let manifest_path = self.stage_dir.join("manifest.json");
        let tmp_path = self.stage_dir.join(format!(".manifest.{}.tmp", uuid::Uuid::now_v7()));
        fs::write(&tmp_path, serde_json::to_vec_pretty(&manifest)?)?;
        fs::rename(&tmp_path, &manifest_path)?;

        self.logger
            .info(&format!("finalized with status {status:?}"));

        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    fn new_job_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn output_path_stays_inside_stage_directory() {
        let job_dir = new_job_dir();
        let io = StageIo::new("asr", job_dir.path(), None).unwrap();
        let out = io.get_output_path("transcript.json").unwrap();
        assert!(out.starts_with(job_dir.path().join("06_asr")));
    }

    #[test]
    fn output_path_rejects_escape() {
        let job_dir = new_job_dir();
        let io = StageIo::new("asr", job_dir.path(), None).unwrap();
        assert!(io.get_output_path("../07_alignment/x").is_err());
    }

    #[test]
    fn input_path_defaults_to_preceding_stage_and_requires_existence() {
        let job_dir = new_job_dir();
        let upstream_dir = job_dir.path().join("05_pyannote_vad");
        stdfs::create_dir_all(&upstream_dir).unwrap();
        stdfs::write(upstream_dir.join("segments.json"), b"[]").unwrap();

        let io = StageIo::new("asr", job_dir.path(), None).unwrap();
        let resolved = io.get_input_path("segments.json", None).unwrap();
        assert_eq!(resolved, upstream_dir.join("segments.json"));

        assert!(io.get_input_path("missing.json", None).is_err());
    }

    #[test]
    fn retracking_the_same_output_path_replaces_rather_than_duplicates() {
        let job_dir = new_job_dir();
        let io = StageIo::new("demux", job_dir.path(), None).unwrap();
        let out = io.get_output_path("audio.wav").unwrap();

        stdfs::write(&out, b"first").unwrap();
        io.track_output("audio", &out);
        stdfs::write(&out, b"second, longer").unwrap();
        io.track_output("audio", &out);

        let manifest = io.finalize(StageStatus::Success).unwrap();
        assert_eq!(manifest.outputs.len(), 1);
        assert_eq!(manifest.outputs[0].size_bytes, Some(14));
    }

    #[test]
    fn finalize_writes_manifest_with_stamped_sizes() {
        let job_dir = new_job_dir();
        let io = StageIo::new("demux", job_dir.path(), None).unwrap();
        let out = io.get_output_path("audio.wav").unwrap();
        stdfs::write(&out, b"not really audio").unwrap();
        io.track_output("audio", &out);

        let manifest = io.finalize(StageStatus::Success).unwrap();
        assert_eq!(manifest.status, StageStatus::Success);
        assert_eq!(manifest.outputs[0].size_bytes, Some(17));

        let on_disk = job_dir.path().join("01_demux").join("manifest.json");
        assert!(on_disk.exists());
    }
}
