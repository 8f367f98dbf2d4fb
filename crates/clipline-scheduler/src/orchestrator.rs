//! The Pipeline Orchestrator (C6): runs a job's planned stages strictly
//! sequentially, enforces fatal-vs-optional semantics, and produces a
//! terminal job status (§4.6).
//!
//! Stage execution is a straight-line loop over the planner's fixed,
//! pre-ordered stage list rather than a topological walk over a `needs`
//! graph (§9); each stage is dispatched through `clipline_env`'s
//! `EnvironmentManager`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use clipline_config::{JobRecord, RawLayer};
use clipline_core::{
    ErrorRecord, JobManifest, StageDescriptor, StageManifest, StageStatus, StageSummary,
    TerminalStatus, Workflow,
};
use clipline_env::{EnvironmentManager, LanguagePair, StageLauncher};
use clipline_stageio::LineLockedWriter;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::planner;

/// The orchestrator's own append-only record of `logs/99_pipeline_*.log`,
/// mirroring each stage transition alongside the `tracing` call that reports
/// it (§4.6). Kept distinct from `StageLogger` since the orchestrator, not a
/// stage process, owns this file.
struct PipelineLog {
    writer: LineLockedWriter,
}

impl PipelineLog {
    fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: LineLockedWriter::open(path)?,
        })
    }

    fn line(&self, level: &str, stage: &str, message: &str) {
        let line = format!(
            "{} [{:>5}] {}: {}\n",
            Utc::now().to_rfc3339(),
            level,
            stage,
            message
        );
        let _ = self.writer.write_line(&line);
    }
}

/// The outcome of checking a stage's manifest before deciding whether to run it.
enum ResumeDecision {
    /// No usable prior manifest; run the stage.
    Rerun,
    /// A finalized, successful manifest whose outputs are still on disk.
    Resume(StageManifest),
    /// A manifest exists but couldn't be parsed.
    Corrupted,
}

/// Default per-stage timeouts (§5): most stages get a generous default, ASR
/// gets hours since large-file batch inference dominates job wall-clock,
/// and demux/mux get short ceilings since they're simple container ops.
fn default_timeout(stage_name: &str) -> Duration {
    match stage_name {
        "demux" | "mux" => Duration::from_secs(10 * 60),
        "asr" => Duration::from_secs(4 * 60 * 60),
        _ => Duration::from_secs(30 * 60),
    }
}

pub struct PipelineOrchestrator<L: StageLauncher> {
    environment_manager: EnvironmentManager<L>,
}

impl<L: StageLauncher> PipelineOrchestrator<L> {
    pub fn new(environment_manager: EnvironmentManager<L>) -> Self {
        Self { environment_manager }
    }

    /// `run(job_id) → terminal_status` (§4.6), taking the job's directory
    /// directly since the allocator is the only thing that needs the bare id.
    pub async fn run(
        &self,
        job_dir: &Path,
        pipeline_defaults_kdl: &str,
        env_overrides: RawLayer,
    ) -> Result<TerminalStatus> {
        let job_record: JobRecord = serde_json::from_slice(&fs::read(job_dir.join("job.json"))?)?;
        let job_overrides = job_record.config_overrides.clone();
        let config = clipline_config::resolve(pipeline_defaults_kdl, &job_overrides, &env_overrides)?;
        let job = job_record.into_job()?;

        let stages = planner::plan(&job)?;

        let log_dir = job_dir.join("logs");
        fs::create_dir_all(&log_dir)?;
        let pipeline_log_path =
            log_dir.join(format!("99_pipeline_{}.log", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
        let pipeline_log = PipelineLog::open(&pipeline_log_path)?;

        let config_path = job_dir.join("config.json");
        fs::write(&config_path, serde_json::to_vec_pretty(&config)?)?;

        let mut job_manifest = JobManifest::new(job.job_id.as_str(), job.workflow.as_str());
        let mut aborted_fatal = false;

        for stage in stages {
            let stage_dir = job_dir.join(stage.directory_name());
            fs::create_dir_all(&stage_dir)?;
            let manifest_path = stage_dir.join("manifest.json");

            match resume_if_possible(&manifest_path, job_dir)? {
                ResumeDecision::Resume(resumed) => {
                    info!(stage = %stage.name, "resumed from prior successful manifest");
                    pipeline_log.line("INFO", stage.name, "RESUMED");
                    job_manifest.stages.push(StageSummary {
                        stage_name: stage.name.to_string(),
                        status: resumed.status,
                        duration_seconds: resumed.duration_seconds,
                        manifest_path: manifest_path.clone(),
                        warning: None,
                    });
                    continue;
                }
                ResumeDecision::Corrupted => {
                    warn!(stage = %stage.name, "existing manifest.json could not be parsed");
                    let fatal = stage.is_fatal_for(job.workflow);
                    pipeline_log.line("ERROR", stage.name, "FAILED (manifest corruption)");
                    let manifest =
                        mark_stage_manifest_corrupted(&manifest_path, stage.name, stage.number)?;
                    let warning = (!fatal)
                        .then(|| format!("optional stage {} failed; pipeline continued", stage.name));
                    job_manifest.stages.push(StageSummary {
                        stage_name: stage.name.to_string(),
                        status: StageStatus::Failed,
                        duration_seconds: manifest.duration_seconds,
                        manifest_path: manifest_path.clone(),
                        warning,
                    });
                    if fatal {
                        aborted_fatal = true;
                        break;
                    }
                    continue;
                }
                ResumeDecision::Rerun => {}
            }

            info!(stage = %stage.name, "STARTING");
            pipeline_log.line("INFO", stage.name, "STARTING");

            let language_pair = translation_language_pair(stage, &job);
            let run_future = self.environment_manager.run_stage(
                stage.name,
                job_dir,
                &config_path,
                job.log_level,
                &config.cache_roots,
                language_pair,
                Some(&pipeline_log_path),
            );

            let status = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    mark_stage_cancelled(&manifest_path)?;
                    pipeline_log.line("ERROR", stage.name, "FAILED (cancelled)");
                    job_manifest.finished_at = Some(Utc::now());
                    job_manifest.terminal_status = Some(TerminalStatus::Failed);
                    write_job_manifest(job_dir, &job_manifest)?;
                    return Ok(TerminalStatus::Failed);
                }
                outcome = tokio::time::timeout(default_timeout(stage.name), run_future) => {
                    match outcome {
                        Ok(Ok(exit_status)) if exit_status.success() => StageStatus::Success,
                        Ok(Ok(_)) => StageStatus::Failed,
                        Ok(Err(e)) => {
                            error!(stage = %stage.name, error = %e, "failed to launch stage process");
                            StageStatus::Failed
                        }
                        Err(_) => {
                            warn!(stage = %stage.name, "stage timed out");
                            mark_stage_cancelled(&manifest_path)?;
                            StageStatus::Failed
                        }
                    }
                }
            };

            let (mut final_status, duration_seconds) =
                reconcile_with_manifest(&manifest_path, stage, status)?;

            if final_status == StageStatus::Running {
                warn!(stage = %stage.name, "stage process exited without calling finalize");
                mark_stage_unfinalized(&manifest_path)?;
                final_status = StageStatus::Failed;
            }

            let fatal = stage.is_fatal_for(job.workflow);
            match final_status {
                StageStatus::Success => {
                    info!(stage = %stage.name, ?duration_seconds, "COMPLETED");
                    pipeline_log.line("INFO", stage.name, "COMPLETED");
                    job_manifest.stages.push(StageSummary {
                        stage_name: stage.name.to_string(),
                        status: final_status,
                        duration_seconds,
                        manifest_path: manifest_path.clone(),
                        warning: None,
                    });
                }
                StageStatus::Skipped => {
                    info!(stage = %stage.name, "SKIPPED");
                    pipeline_log.line("INFO", stage.name, "SKIPPED");
                    job_manifest.stages.push(StageSummary {
                        stage_name: stage.name.to_string(),
                        status: final_status,
                        duration_seconds,
                        manifest_path: manifest_path.clone(),
                        warning: None,
                    });
                }
                StageStatus::Failed | StageStatus::Running => {
                    error!(stage = %stage.name, fatal, "FAILED");
                    pipeline_log.line("ERROR", stage.name, "FAILED");
                    let warning = (!fatal)
                        .then(|| format!("optional stage {} failed; pipeline continued", stage.name));
                    job_manifest.stages.push(StageSummary {
                        stage_name: stage.name.to_string(),
                        status: StageStatus::Failed,
                        duration_seconds,
                        manifest_path: manifest_path.clone(),
                        warning,
                    });
                    if fatal {
                        aborted_fatal = true;
                        break;
                    }
                }
            }
        }

        let terminal_status = if aborted_fatal {
            TerminalStatus::Failed
        } else if job_manifest.stages.iter().any(|s| s.warning.is_some()) {
            TerminalStatus::Partial
        } else {
            TerminalStatus::Success
        };

        job_manifest.finished_at = Some(Utc::now());
        job_manifest.terminal_status = Some(terminal_status);
        write_job_manifest(job_dir, &job_manifest)?;

        Ok(terminal_status)
    }
}

/// Translation is routed per language pair (§4.3); with more than one target
/// language the first is used to pick the environment, a simplification
/// recorded as an open-question decision since mixed-language-family target
/// sets are otherwise unresolved.
fn translation_language_pair<'a>(
    stage: &StageDescriptor,
    job: &'a clipline_core::Job,
) -> Option<LanguagePair<'a>> {
    if stage.name != "translation" {
        return None;
    }
    job.target_languages.first().map(|target| LanguagePair {
        source: job.source_language.as_str(),
        target: target.as_str(),
    })
}

/// The Resume Predicate (§4.6 step 4a, §9 glossary): a stage may be skipped
/// on a re-run if its manifest is finalized `success` and every tracked
/// output still exists. This crate doesn't attempt the fuller "config hasn't
/// changed in ways affecting this stage" check — recorded as an
/// open-question decision in the design ledger.
///
/// A manifest that exists but fails to parse (truncated by a prior crash,
/// for instance) is reported as `Corrupted` rather than propagated as an
/// error: the caller synthesizes a failed stage outcome for it and lets the
/// ordinary fatal/optional rules decide whether the job continues (§7
/// `ManifestCorruption`).
fn resume_if_possible(manifest_path: &Path, job_dir: &Path) -> Result<ResumeDecision> {
    let Ok(bytes) = fs::read(manifest_path) else {
        return Ok(ResumeDecision::Rerun);
    };
    let manifest: StageManifest = match serde_json::from_slice(&bytes) {
        Ok(manifest) => manifest,
        Err(_) => return Ok(ResumeDecision::Corrupted),
    };
    if manifest.status != StageStatus::Success {
        return Ok(ResumeDecision::Rerun);
    }
    let outputs_intact = manifest
        .outputs
        .iter()
        .all(|tracked| job_dir.join(&tracked.path).exists());
    Ok(if outputs_intact {
        ResumeDecision::Resume(manifest)
    } else {
        ResumeDecision::Rerun
    })
}

/// After a stage process exits, its own manifest (written via `StageIo::finalize`)
/// is authoritative when present. A missing manifest after a run is itself a
/// contract violation and is always treated as failed, regardless of exit code.
/// A manifest that exists but is corrupt is rewritten in place as a failed
/// `ManifestCorruption` outcome rather than propagated as a hard error (§7).
fn reconcile_with_manifest(
    manifest_path: &Path,
    stage: &StageDescriptor,
    exit_outcome: StageStatus,
) -> Result<(StageStatus, Option<f64>)> {
    let on_disk = match fs::read(manifest_path) {
        Ok(bytes) => match serde_json::from_slice::<StageManifest>(&bytes) {
            Ok(manifest) => Some((manifest.status, manifest.duration_seconds)),
            Err(_) => {
                warn!(stage = %stage.name, "manifest.json failed to parse; marking stage failed");
                let manifest =
                    mark_stage_manifest_corrupted(manifest_path, stage.name, stage.number)?;
                Some((manifest.status, manifest.duration_seconds))
            }
        },
        Err(_) => None,
    };

    match (exit_outcome, on_disk) {
        (StageStatus::Failed, _) => Ok((StageStatus::Failed, on_disk.and_then(|(_, d)| d))),
        (_, Some((status, duration))) => Ok((status, duration)),
        (_, None) => Ok((StageStatus::Failed, None)),
    }
}

/// Rewrite a still-`running` stage manifest as `failed` with a `"cancelled"`
/// error record (§4.6 cancellation handling, §5).
fn mark_stage_cancelled(manifest_path: &Path) -> Result<()> {
    let Ok(bytes) = fs::read(manifest_path) else {
        return Ok(());
    };
    let mut manifest: StageManifest = serde_json::from_slice(&bytes)?;
    if manifest.status != StageStatus::Running {
        return Ok(());
    }

    let end = Utc::now();
    manifest.duration_seconds = Some((end - manifest.start_timestamp).num_milliseconds() as f64 / 1000.0);
    manifest.end_timestamp = Some(end);
    manifest.status = StageStatus::Failed;
    manifest.errors.push(ErrorRecord {
        message: "cancelled".to_string(),
        kind: Some("Cancelled".to_string()),
        occurred_at: end,
    });

    write_atomic(manifest_path, &manifest)
}

/// Rewrite a still-`running` stage manifest as `failed` with a
/// `"stage terminated without finalization"` error record, for a process
/// that exited (even successfully) without ever calling `StageIo::finalize` (§4.5).
fn mark_stage_unfinalized(manifest_path: &Path) -> Result<()> {
    let Ok(bytes) = fs::read(manifest_path) else {
        return Ok(());
    };
    let mut manifest: StageManifest = serde_json::from_slice(&bytes)?;
    if manifest.status != StageStatus::Running {
        return Ok(());
    }

    let end = Utc::now();
    manifest.duration_seconds = Some((end - manifest.start_timestamp).num_milliseconds() as f64 / 1000.0);
    manifest.end_timestamp = Some(end);
    manifest.status = StageStatus::Failed;
    manifest.errors.push(ErrorRecord {
        message: "stage terminated without finalization".to_string(),
        kind: Some("StageExecutionFailure".to_string()),
        occurred_at: end,
    });

    write_atomic(manifest_path, &manifest)
}

/// Replace a manifest that couldn't be parsed with a well-formed `failed`
/// one carrying a `ManifestCorruption` error record, so downstream readers
/// (the job summary, a later resume attempt) always see valid JSON at
/// `manifest.json` (§7 `ManifestCorruption`).
fn mark_stage_manifest_corrupted(
    manifest_path: &Path,
    stage_name: &str,
    stage_number: u32,
) -> Result<StageManifest> {
    let mut manifest = StageManifest::new(stage_name, stage_number);
    let end = Utc::now();
    manifest.end_timestamp = Some(end);
    manifest.duration_seconds = Some(0.0);
    manifest.status = StageStatus::Failed;
    manifest.errors.push(ErrorRecord {
        message: "manifest.json could not be parsed".to_string(),
        kind: Some("ManifestCorruption".to_string()),
        occurred_at: end,
    });

    write_atomic(manifest_path, &manifest)?;
    Ok(manifest)
}

fn write_job_manifest(job_dir: &Path, manifest: &JobManifest) -> Result<()> {
    write_atomic(&job_dir.join("manifest.json"), manifest)
}

fn write_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipline_core::registry;

    #[test]
    fn resume_requires_success_and_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = StageManifest::new("demux", 1);
        manifest.status = StageStatus::Success;
        manifest
            .outputs
            .push(clipline_core::TrackedFile::new("audio", "01_demux/audio.wav".into()));
        let manifest_path = dir.path().join("manifest.json");
        fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        assert!(matches!(
            resume_if_possible(&manifest_path, dir.path()).unwrap(),
            ResumeDecision::Rerun
        ));

        fs::create_dir_all(dir.path().join("01_demux")).unwrap();
        fs::write(dir.path().join("01_demux/audio.wav"), b"x").unwrap();
        assert!(matches!(
            resume_if_possible(&manifest_path, dir.path()).unwrap(),
            ResumeDecision::Resume(_)
        ));
    }

    #[test]
    fn resume_reports_corrupted_manifest_without_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("manifest.json");
        fs::write(&manifest_path, b"{not valid json").unwrap();

        assert!(matches!(
            resume_if_possible(&manifest_path, dir.path()).unwrap(),
            ResumeDecision::Corrupted
        ));
    }

    #[test]
    fn mark_cancelled_rewrites_running_manifest_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = StageManifest::new("asr", 6);
        let manifest_path = dir.path().join("manifest.json");
        fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        mark_stage_cancelled(&manifest_path).unwrap();

        let rewritten: StageManifest =
            serde_json::from_slice(&fs::read(&manifest_path).unwrap()).unwrap();
        assert_eq!(rewritten.status, StageStatus::Failed);
        assert_eq!(rewritten.errors[0].kind.as_deref(), Some("Cancelled"));
    }

    #[test]
    fn mark_unfinalized_rewrites_running_manifest_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = StageManifest::new("alignment", 7);
        let manifest_path = dir.path().join("manifest.json");
        fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        mark_stage_unfinalized(&manifest_path).unwrap();

        let rewritten: StageManifest =
            serde_json::from_slice(&fs::read(&manifest_path).unwrap()).unwrap();
        assert_eq!(rewritten.status, StageStatus::Failed);
        assert_eq!(
            rewritten.errors[0].message,
            "stage terminated without finalization"
        );
        assert_eq!(
            rewritten.errors[0].kind.as_deref(),
            Some("StageExecutionFailure")
        );
    }

    #[test]
    fn reconcile_rewrites_corrupted_manifest_as_failed_manifest_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("manifest.json");
        fs::write(&manifest_path, b"not json at all").unwrap();
        let stage = registry::stage("asr").unwrap();

        let (status, _duration) =
            reconcile_with_manifest(&manifest_path, stage, StageStatus::Success).unwrap();
        assert_eq!(status, StageStatus::Failed);

        let rewritten: StageManifest =
            serde_json::from_slice(&fs::read(&manifest_path).unwrap()).unwrap();
        assert_eq!(rewritten.status, StageStatus::Failed);
        assert_eq!(
            rewritten.errors[0].kind.as_deref(),
            Some("ManifestCorruption")
        );
    }

    #[test]
    fn translation_language_pair_uses_first_target() {
        let job = clipline_core::Job {
            job_id: clipline_core::JobId::new(Utc::now().date_naive(), "acme", 1),
            workflow: Workflow::Subtitle,
            input_media: "/media/in.mp4".into(),
            source_language: "hi".to_string(),
            target_languages: vec!["en".to_string(), "gu".to_string()],
            clip_window: None,
            feature_flags: Default::default(),
            log_level: Default::default(),
            created_at: Utc::now(),
        };
        let stage = registry::stage("translation").unwrap();
        let pair = translation_language_pair(stage, &job).unwrap();
        assert_eq!(pair.source, "hi");
        assert_eq!(pair.target, "en");
    }
}
