//! `EnvironmentManager`: ties environment routing, the cache-root policy, and
//! the subprocess launcher into the single `run_stage` contract (§4.4).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clipline_core::{HardwareCapabilityReport, registry};

use crate::error::Result;
use crate::launcher::{LaunchSpec, StageLauncher, cache_root_env};
use crate::resolve::{LanguagePair, resolve_environment};

/// Root directory under which every environment's isolated dependency tree
/// lives, one subdirectory per environment name (`whisperx/`, `mlx/`,
/// `indictrans2/`, ...). Populating that tree is the out-of-scope bootstrap
/// step (§4.4); this manager only ever reads from it.
pub struct EnvironmentManager<L: StageLauncher> {
    environments_root: PathBuf,
    launcher: L,
    hardware: HardwareCapabilityReport,
}

impl<L: StageLauncher> EnvironmentManager<L> {
    pub fn new(environments_root: PathBuf, launcher: L, hardware: HardwareCapabilityReport) -> Self {
        Self {
            environments_root,
            launcher,
            hardware,
        }
    }

    /// An environment's module entry point: `<environments_root>/<env>/bin/run_stage`,
    /// invoked with the stage name as its sole positional argument. Stages
    /// themselves are out of scope (§1); this is the fixed convention their
    /// bootstrap step must honor.
    fn entry_point(&self, environment: &str) -> PathBuf {
        self.environments_root.join(environment).join("bin").join("run_stage")
    }

    /// `run_stage(stage_name, job_dir, config_path, log_level) → exit_code` (§4.4).
    pub async fn run_stage(
        &self,
        stage_name: &str,
        job_dir: &Path,
        config_path: &Path,
        log_level: clipline_core::LogLevel,
        cache_roots: &BTreeMap<String, PathBuf>,
        language_pair: Option<LanguagePair<'_>>,
        shared_log_path: Option<&Path>,
    ) -> Result<std::process::ExitStatus> {
        let descriptor = registry::stage(stage_name)?;
        let environment = resolve_environment(descriptor.environment, &self.hardware, language_pair)?;

        let mut env = cache_root_env(cache_roots);
        env.insert("CLIPLINE_JOB_DIR".to_string(), job_dir.to_string_lossy().into_owned());
        env.insert(
            "CLIPLINE_CONFIG_PATH".to_string(),
            config_path.to_string_lossy().into_owned(),
        );
        env.insert("CLIPLINE_LOG_LEVEL".to_string(), log_level.as_tracing_filter().to_string());

        let spec = LaunchSpec {
            stage_name: stage_name.to_string(),
            job_dir: job_dir.to_path_buf(),
            executable: self.entry_point(environment),
            args: vec![stage_name.to_string()],
            env,
            shared_log_path: shared_log_path.map(Path::to_path_buf),
        };

        let mut child = self.launcher.launch(&spec).await?;
        let status = child.wait().await?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::SubprocessLauncher;

    #[tokio::test]
    async fn run_stage_resolves_entry_point_and_surfaces_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let env_root = dir.path().join("environments");
        let bin_dir = env_root.join("common").join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();

        // A trivial "stage module": a shell script that always succeeds.
        let script_path = bin_dir.join("run_stage");
        std::fs::write(&script_path, "#!/bin/sh\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let manager = EnvironmentManager::new(
            env_root,
            SubprocessLauncher::new(),
            HardwareCapabilityReport::default(),
        );

        let job_dir = dir.path().join("job");
        std::fs::create_dir_all(&job_dir).unwrap();
        let config_path = job_dir.join("config.json");

        let status = manager
            .run_stage(
                "demux",
                &job_dir,
                &config_path,
                clipline_core::LogLevel::Info,
                &BTreeMap::new(),
                None,
                None,
            )
            .await
            .unwrap();
        assert!(status.success());
    }
}
