//! The Workflow Planner (C7): turns a job's workflow, feature flags, and
//! target-language set into the concrete ordered stage list to execute (§4.7).
//!
//! Two-step transcription and the multi-pass/bias flags alter stage
//! *behavior* through `PipelineConfig`, not stage *selection* — they never
//! appear in the rules below.

use clipline_core::{Job, StageDescriptor, Workflow, registry};

use crate::error::Result;

/// `plan(job) → ordered stage list` (§4.7).
pub fn plan(job: &Job) -> Result<Vec<&'static StageDescriptor>> {
    let flags = &job.feature_flags;
    let mut stages = Vec::new();

    stages.push(registry::stage("demux")?);
    stages.push(registry::stage("tmdb")?);
    stages.push(registry::stage("glossary_load")?);
    if flags.source_separation {
        stages.push(registry::stage("source_separation")?);
    }
    if flags.voice_activity_detection {
        stages.push(registry::stage("pyannote_vad")?);
    }
    stages.push(registry::stage("asr")?);
    stages.push(registry::stage("alignment")?);
    if flags.lyrics_detection {
        stages.push(registry::stage("lyrics_detection")?);
    }

    if job.workflow.requires_targets() {
        stages.push(registry::stage("translation")?);
    }

    if job.workflow.produces_mux() {
        stages.push(registry::stage("subtitle_generation")?);
        stages.push(registry::stage("mux")?);
    }

    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clipline_core::{FeatureFlags, JobId, LogLevel};

    fn base_job(workflow: Workflow) -> Job {
        Job {
            job_id: JobId::new(Utc::now().date_naive(), "acme", 1),
            workflow,
            input_media: "/media/in.mp4".into(),
            source_language: "hi".to_string(),
            target_languages: if workflow.requires_targets() {
                vec!["en".to_string()]
            } else {
                vec![]
            },
            clip_window: None,
            feature_flags: FeatureFlags::default(),
            log_level: LogLevel::Info,
            created_at: Utc::now(),
        }
    }

    fn names(stages: &[&'static StageDescriptor]) -> Vec<&'static str> {
        stages.iter().map(|s| s.name).collect()
    }

    #[test]
    fn transcribe_plan_excludes_flag_gated_optional_stages_by_default() {
        let job = base_job(Workflow::Transcribe);
        let plan = plan(&job).unwrap();
        assert_eq!(
            names(&plan),
            vec!["demux", "tmdb", "glossary_load", "asr", "alignment"]
        );
    }

    #[test]
    fn transcribe_plan_includes_flag_gated_stages_when_enabled() {
        let mut job = base_job(Workflow::Transcribe);
        job.feature_flags.source_separation = true;
        job.feature_flags.voice_activity_detection = true;
        job.feature_flags.lyrics_detection = true;
        let plan = plan(&job).unwrap();
        assert_eq!(
            names(&plan),
            vec![
                "demux",
                "tmdb",
                "glossary_load",
                "source_separation",
                "pyannote_vad",
                "asr",
                "alignment",
                "lyrics_detection",
            ]
        );
    }

    #[test]
    fn translate_plan_appends_translation() {
        let job = base_job(Workflow::Translate);
        let plan = plan(&job).unwrap();
        assert_eq!(plan.last().unwrap().name, "translation");
    }

    #[test]
    fn subtitle_plan_appends_translation_then_subtitle_generation_then_mux() {
        let job = base_job(Workflow::Subtitle);
        let plan = plan(&job).unwrap();
        let stage_names = names(&plan);
        let tail = &stage_names[stage_names.len() - 3..];
        assert_eq!(tail, &["translation", "subtitle_generation", "mux"]);
    }
}
