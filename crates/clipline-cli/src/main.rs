//! Clipline CLI: `prepare` allocates a job and writes its `job.json`,
//! `run` drives an allocated job to completion through the orchestrator.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clipline_config::{JobRecord, MediaProcessingMode};
use clipline_core::{HardwareCapabilityReport, LogLevel, TerminalStatus, Workflow};
use clipline_env::{EnvironmentManager, SubprocessLauncher};
use clipline_scheduler::PipelineOrchestrator;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clipline")]
#[command(about = "Batch media pipeline: audio/video in, transcripts/translations/subtitled video out")]
struct Cli {
    /// Root directory job directories are allocated under.
    #[arg(long, env = "CLIPLINE_OUTPUT_ROOT", default_value = "./clipline-output")]
    output_root: PathBuf,

    /// Root directory holding each environment's isolated dependency tree.
    #[arg(long, env = "CLIPLINE_ENVIRONMENTS_ROOT", default_value = "./environments")]
    environments_root: PathBuf,

    /// Path to the pipeline-defaults KDL file.
    #[arg(
        long,
        env = "CLIPLINE_PIPELINE_DEFAULTS",
        default_value = "./pipeline-defaults.kdl"
    )]
    pipeline_defaults: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Allocate a job directory and write job.json from CLI flags.
    Prepare {
        /// Tenant the job belongs to; becomes part of the job id and output path.
        #[arg(long)]
        tenant: String,
        /// transcribe | translate | subtitle
        #[arg(long)]
        workflow: String,
        #[arg(long)]
        input_media: PathBuf,
        #[arg(long)]
        source_language: String,
        /// May be repeated; required for translate/subtitle workflows.
        #[arg(long = "target-language")]
        target_languages: Vec<String>,
        /// full | clip
        #[arg(long, default_value = "full")]
        media_processing_mode: String,
        #[arg(long)]
        media_start_time: Option<String>,
        #[arg(long)]
        media_end_time: Option<String>,
        #[arg(long)]
        two_step_transcription: bool,
        #[arg(long)]
        source_separation: bool,
        #[arg(long)]
        voice_activity_detection: bool,
        #[arg(long)]
        multi_pass_refinement: bool,
        #[arg(long)]
        speaker_aware_bias: bool,
        #[arg(long)]
        lyrics_detection: bool,
        /// debug | info | warn | error
        #[arg(long, default_value = "info")]
        log_level: String,
    },
    /// Run a previously prepared job to completion.
    Run {
        /// The job id printed by `prepare`.
        job_id: String,
        /// Tenant the job was allocated under (needed to locate its directory;
        /// not reliably recoverable from the id alone, see `JobId::job_relative_path`).
        #[arg(long)]
        tenant: String,
    },
}

fn parse_workflow(raw: &str) -> Result<Workflow> {
    match raw {
        "transcribe" => Ok(Workflow::Transcribe),
        "translate" => Ok(Workflow::Translate),
        "subtitle" => Ok(Workflow::Subtitle),
        other => bail!("unknown workflow {other:?}, expected transcribe|translate|subtitle"),
    }
}

fn parse_media_processing_mode(raw: &str) -> Result<MediaProcessingMode> {
    match raw {
        "full" => Ok(MediaProcessingMode::Full),
        "clip" => Ok(MediaProcessingMode::Clip),
        other => bail!("unknown media processing mode {other:?}, expected full|clip"),
    }
}

fn parse_log_level(raw: &str) -> Result<LogLevel> {
    match raw {
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        other => bail!("unknown log level {other:?}, expected debug|info|warn|error"),
    }
}

/// Environment variables of the form `CLIPLINE_OVERRIDE_ASR_BEAM_WIDTH=8` become
/// the runtime override layer's `asr-beam-width` key (§4.1 top precedence tier).
fn env_overrides_from_process_env() -> clipline_config::RawLayer {
    let raw: BTreeMap<String, String> = std::env::vars()
        .filter_map(|(k, v)| {
            k.strip_prefix("CLIPLINE_OVERRIDE_")
                .map(|rest| (rest.to_lowercase().replace('_', "-"), v))
        })
        .collect();
    clipline_config::env_layer_from_strings(raw)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Prepare {
            tenant,
            workflow,
            input_media,
            source_language,
            target_languages,
            media_processing_mode,
            media_start_time,
            media_end_time,
            two_step_transcription,
            source_separation,
            voice_activity_detection,
            multi_pass_refinement,
            speaker_aware_bias,
            lyrics_detection,
            log_level,
        } => {
            let job_record = JobRecord {
                job_id: String::new(),
                workflow: parse_workflow(workflow)?,
                input_media: input_media.clone(),
                source_language: source_language.clone(),
                target_languages: target_languages.clone(),
                media_processing_mode: parse_media_processing_mode(media_processing_mode)?,
                media_start_time: media_start_time.clone(),
                media_end_time: media_end_time.clone(),
                two_step_transcription: *two_step_transcription,
                source_separation: *source_separation,
                voice_activity_detection: *voice_activity_detection,
                multi_pass_refinement: *multi_pass_refinement,
                speaker_aware_bias: *speaker_aware_bias,
                lyrics_detection: *lyrics_detection,
                log_level: parse_log_level(log_level)?,
                created_at: chrono::Utc::now(),
                config_overrides: BTreeMap::new(),
            };

            let allocated = clipline_scheduler::allocate(&cli.output_root, tenant, job_record)
                .context("failed to allocate job directory")?;
            println!("{}", allocated.job_id);
            Ok(())
        }
        Commands::Run { job_id, tenant } => {
            let job_id: clipline_core::JobId = job_id
                .parse()
                .expect("JobId parsing from a plain string is infallible");
            let relative = job_id.job_relative_path(tenant).with_context(|| {
                format!("job id {job_id} is not in the expected job-YYYYMMDD-...-NNNN form")
            })?;
            let job_dir = cli.output_root.join(relative);
            if !job_dir.join("job.json").exists() {
                bail!("no job.json found under {}", job_dir.display());
            }

            let pipeline_defaults_kdl = std::fs::read_to_string(&cli.pipeline_defaults)
                .with_context(|| {
                    format!(
                        "failed to read pipeline defaults at {}",
                        cli.pipeline_defaults.display()
                    )
                })?;

            let manager = EnvironmentManager::new(
                cli.environments_root.clone(),
                SubprocessLauncher::new(),
                HardwareCapabilityReport::default(),
            );
            let orchestrator = PipelineOrchestrator::new(manager);

            let status = orchestrator
                .run(&job_dir, &pipeline_defaults_kdl, env_overrides_from_process_env())
                .await
                .context("pipeline run failed")?;

            match status {
                TerminalStatus::Success | TerminalStatus::Partial => Ok(()),
                TerminalStatus::Failed => std::process::exit(1),
            }
        }
    }
}
