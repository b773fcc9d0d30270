//! Detached worker process spawning (spec.md §4.4 Spawning, §5). Workers
//! are launched in their own process group so a SIGINT/SIGTERM delivered
//! to the orchestrator's terminal does not cascade to them — the
//! orchestrator can exit (or be killed) while workers keep running.

use crate::errors::OrchestratorError;
use batchforge_common::{build_job_id, JobConfig, Range};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

pub struct SpawnPlan<'a> {
    pub worker_binary: &'a Path,
    pub range: Range,
    pub input_file: &'a Path,
    pub output_path: &'a Path,
    pub prompts_config: &'a Path,
    pub run_id: &'a str,
    pub project_path: &'a Path,
    pub config: &'a JobConfig,
}

impl SpawnPlan<'_> {
    fn output_name(&self) -> String {
        self.output_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }

    fn pause_file(&self) -> PathBuf {
        self.config.monitoring.status_dir.join(self.run_id).join("pause.flag")
    }

    pub fn job_id(&self) -> String {
        build_job_id(self.range.start, self.range.end, self.range.worker_id, self.run_id)
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(self.worker_binary);
        cmd.arg("--worker-id")
            .arg(self.range.worker_id.to_string())
            .arg("--input-file")
            .arg(self.input_file)
            .arg("--row-start")
            .arg(self.range.start.to_string())
            .arg("--row-end")
            .arg(self.range.end.to_string())
            .arg("--model")
            .arg(&self.config.model.name)
            .arg("--batch-size")
            .arg(self.config.model.batch_size.to_string())
            .arg("--prompts-config")
            .arg(self.prompts_config)
            .arg("--output-dir")
            .arg(self.output_path.parent().unwrap_or_else(|| Path::new(".")))
            .arg("--output-name")
            .arg(self.output_name())
            .arg("--checkpoint-dir")
            .arg(self.config.output.checkpoints.directory.join(self.run_id))
            .arg("--checkpoint-interval")
            .arg(self.config.output.checkpoints.interval.to_string())
            .arg("--status-dir")
            .arg(&self.config.monitoring.status_dir)
            .arg("--project-path")
            .arg(self.project_path)
            .arg("--run-id")
            .arg(self.run_id)
            .arg("--retries")
            .arg(self.config.model.retries.to_string())
            .arg("--delay")
            .arg(self.config.model.delay.to_string())
            .arg("--pause-file")
            .arg(self.pause_file())
            .arg("--model-base-url")
            .arg(&self.config.model.base_url)
            .arg("--model-timeout-secs")
            .arg(self.config.model.timeout_secs.to_string());
        if let Some(api_key) = &self.config.model.api_key {
            cmd.arg("--model-api-key").arg(api_key);
        }
        if self.config.output.checkpoints.keep_merged {
            cmd.arg("--keep-merged");
        }
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        cmd
    }
}

/// Spawn one worker, detached into its own process group on Unix so it
/// survives the orchestrator receiving a terminal signal.
pub fn spawn_detached(plan: &SpawnPlan<'_>) -> Result<Child, OrchestratorError> {
    let mut cmd = plan.command();
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }
    cmd.spawn().map_err(OrchestratorError::SpawnFailed)
}
