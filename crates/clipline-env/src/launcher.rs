//! Subprocess-based stage launching (§4.4): one stage module per isolated
//! child process, spawned with `tokio::process::Command` against a single
//! executable path rather than a container/pod backend, since stage
//! isolation here comes from per-environment dependency trees on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::error::Result;

/// Environment variable names forwarded from the manager's own process
/// environment into every stage child, on top of the job- and
/// environment-specific variables set explicitly below. Kept minimal: this
/// is the isolation guarantee in code (§4.4), not just policy.
const INHERITED_ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "LANG", "TMPDIR"];

/// Everything the manager resolves before handing a stage off to a launcher:
/// which environment's dependency tree to run inside, what to run, and the
/// environment block the child must see.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub stage_name: String,
    pub job_dir: PathBuf,
    /// Path to the interpreter or entry point inside the resolved
    /// environment's isolated dependency tree.
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// Job configuration path, log level, cache roots, and any
    /// stage-specific variables, already flattened to strings (§4.4).
    pub env: BTreeMap<String, String>,
    /// Forwarded as `PIPELINE_LOG_PATH` so the stage's `StageIo` can mirror
    /// INFO+ records into the shared pipeline log (§4.5).
    pub shared_log_path: Option<PathBuf>,
}

/// Launches a stage module as a child process and hands back the running
/// child; the caller (the orchestrator) owns waiting, timeout, and
/// cancellation (§4.6) so the launcher itself stays a thin isolation boundary.
#[async_trait]
pub trait StageLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Child>;
}

pub struct SubprocessLauncher;

impl SubprocessLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SubprocessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageLauncher for SubprocessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Child> {
        let mut command = Command::new(&spec.executable);
        command
            .args(&spec.args)
            .current_dir(&spec.job_dir)
            .env_clear()
            .kill_on_drop(true);

        for name in INHERITED_ENV_ALLOWLIST {
            if let Ok(value) = std::env::var(name) {
                command.env(name, value);
            }
        }

        for (key, value) in &spec.env {
            command.env(key, value);
        }

        if let Some(path) = &spec.shared_log_path {
            command.env("PIPELINE_LOG_PATH", path);
        }

        tracing::info!(
            stage = %spec.stage_name,
            executable = %spec.executable.display(),
            "launching stage process"
        );

        let child = command.spawn()?;
        Ok(child)
    }
}

/// Build the cache-root environment block every stage receives regardless of
/// whether it needs it, so a model downloaded by one stage is visible to a
/// later one sharing the same framework (§4.4 cache root policy).
pub fn cache_root_env(cache_roots: &std::collections::BTreeMap<String, PathBuf>) -> BTreeMap<String, String> {
    cache_roots
        .iter()
        .map(|(framework, path)| (format!("{}_CACHE_ROOT", framework.to_uppercase()), path_to_string(path)))
        .collect()
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_roots_become_uppercased_env_vars() {
        let mut roots = BTreeMap::new();
        roots.insert("whisperx".to_string(), PathBuf::from(".cache/whisperx"));
        let env = cache_root_env(&roots);
        assert_eq!(env["WHISPERX_CACHE_ROOT"], ".cache/whisperx");
    }

    #[tokio::test]
    async fn subprocess_launcher_runs_a_trivial_command() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = SubprocessLauncher::new();
        let spec = LaunchSpec {
            stage_name: "demux".to_string(),
            job_dir: dir.path().to_path_buf(),
            executable: PathBuf::from("/bin/true"),
            args: vec![],
            env: BTreeMap::new(),
            shared_log_path: None,
        };
        let mut child = launcher.launch(&spec).await.unwrap();
        let status = child.wait().await.unwrap();
        assert!(status.success());
    }
}
