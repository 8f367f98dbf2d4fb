//! The Job Allocator (C2): assigns a job id and a canonical, exclusively
//! owned job directory, and persists `job.json` atomically.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clipline_config::JobRecord;
use clipline_core::JobId;

use crate::error::{Error, Result};

/// The allocator never retries past this many sequence numbers for a given
/// day/tenant before failing with `ResourceExhausted` (§4.2).
pub const DEFAULT_ALLOCATION_CEILING: u32 = 9999;

pub struct AllocatedJob {
    pub job_id: JobId,
    pub job_dir: PathBuf,
}

/// `allocate(output_root, tenant) → (job_id, job_dir)` (§4.2).
///
/// `job_record` is written into the new directory as `job.json`, with its
/// `job_id` field overwritten to the id this call allocates — the caller
/// doesn't need to know the id in advance.
pub fn allocate(output_root: &Path, tenant: &str, job_record: JobRecord) -> Result<AllocatedJob> {
    allocate_with_ceiling(output_root, tenant, job_record, DEFAULT_ALLOCATION_CEILING)
}

pub fn allocate_with_ceiling(
    output_root: &Path,
    tenant: &str,
    mut job_record: JobRecord,
    ceiling: u32,
) -> Result<AllocatedJob> {
    let today = Utc::now().date_naive();
    let day_dir = output_root
        .join(format!("{:04}", today.format("%Y")))
        .join(format!("{:02}", today.format("%m")))
        .join(format!("{:02}", today.format("%d")))
        .join(tenant);
    fs::create_dir_all(&day_dir)?;

    for sequence in 1..=ceiling {
        let candidate_dir = day_dir.join(sequence.to_string());
        match fs::create_dir(&candidate_dir) {
            Ok(()) => {
                let job_id = JobId::new(today, tenant, sequence);
                fs::create_dir_all(candidate_dir.join("logs"))?;

                job_record.job_id = job_id.to_string();
                let tmp_path = candidate_dir.join(".job.json.tmp");
                fs::write(&tmp_path, serde_json::to_vec_pretty(&job_record)?)?;
                fs::rename(&tmp_path, candidate_dir.join("job.json"))?;

                return Ok(AllocatedJob {
                    job_id,
                    job_dir: candidate_dir,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::ResourceExhausted(day_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipline_config::MediaProcessingMode;

    fn sample_record() -> JobRecord {
        JobRecord {
            job_id: String::new(),
            workflow: clipline_core::Workflow::Transcribe,
            input_media: "/media/in.mp4".into(),
            source_language: "hi".to_string(),
            target_languages: vec![],
            media_processing_mode: MediaProcessingMode::Full,
            media_start_time: None,
            media_end_time: None,
            two_step_transcription: false,
            source_separation: false,
            voice_activity_detection: false,
            multi_pass_refinement: false,
            speaker_aware_bias: false,
            lyrics_detection: false,
            log_level: clipline_core::LogLevel::Info,
            created_at: Utc::now(),
            config_overrides: Default::default(),
        }
    }

    #[test]
    fn allocates_sequence_one_on_first_call_and_writes_job_json() {
        let dir = tempfile::tempdir().unwrap();
        let allocated = allocate(dir.path(), "acme", sample_record()).unwrap();
        assert!(allocated.job_id.as_str().contains("acme"));
        assert!(allocated.job_id.as_str().ends_with("0001"));
        assert!(allocated.job_dir.join("job.json").exists());
        assert!(allocated.job_dir.join("logs").is_dir());
    }

    #[test]
    fn second_allocation_same_day_and_tenant_gets_next_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let first = allocate(dir.path(), "acme", sample_record()).unwrap();
        let second = allocate(dir.path(), "acme", sample_record()).unwrap();
        assert_ne!(first.job_dir, second.job_dir);
        assert!(second.job_id.as_str().ends_with("0002"));
    }

    #[test]
    fn exhausted_ceiling_reports_resource_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let first = allocate_with_ceiling(dir.path(), "acme", sample_record(), 1).unwrap();
        assert!(first.job_id.as_str().ends_with("0001"));
        let err = allocate_with_ceiling(dir.path(), "acme", sample_record(), 1);
        assert!(matches!(err, Err(Error::ResourceExhausted(_))));
    }
}
