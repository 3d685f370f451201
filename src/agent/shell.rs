// ABOUTME: Shell agent running step scripts from the project's stages directory.
// ABOUTME: Captures output, enforces the timeout, and collects the step report.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::env::vars;
use super::{AgentError, AgentOutcome, StageAgent, StageEnv, Step, parse_report};

/// Runs `{stages_dir}/{step}` with the step environment.
///
/// Each run gets a fresh output directory under `work_dir`; whatever the script
/// writes there is the step's artifact.
#[derive(Debug, Clone)]
pub struct ShellAgent {
    stages_dir: PathBuf,
    work_dir: PathBuf,
    current_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ShellAgent {
    pub fn new(stages_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            stages_dir: stages_dir.into(),
            work_dir: work_dir.into(),
            current_dir: None,
            timeout: Duration::from_secs(30 * 60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Directory scripts run in. Defaults to the inherited one.
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn script_exists(&self, step: Step) -> bool {
        self.script_path(step).is_file()
    }

    fn script_path(&self, step: Step) -> PathBuf {
        self.stages_dir.join(step.script_name())
    }

    async fn prepare_output(&self, run: &str, step: Step) -> Result<(PathBuf, PathBuf), AgentError> {
        let run_dir = self.work_dir.join(run);
        let output_dir = run_dir.join(step.script_name());
        if tokio::fs::try_exists(&output_dir).await? {
            tokio::fs::remove_dir_all(&output_dir).await?;
        }
        tokio::fs::create_dir_all(&output_dir).await?;
        let report = run_dir.join(format!("{}.report", step.script_name()));
        if tokio::fs::try_exists(&report).await? {
            tokio::fs::remove_file(&report).await?;
        }
        Ok((output_dir, report))
    }
}

async fn has_entries(dir: &Path) -> Result<bool, AgentError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    Ok(entries.next_entry().await?.is_some())
}

#[async_trait]
impl StageAgent for ShellAgent {
    async fn run(&self, step: Step, env: &StageEnv) -> Result<AgentOutcome, AgentError> {
        let script = self.script_path(step);
        if !script.is_file() {
            tracing::debug!(%step, script = %script.display(), "no script, step skipped");
            return Ok(AgentOutcome::skipped());
        }

        let run = env.get(vars::RUN_ID).unwrap_or("adhoc");
        let (output_dir, report) = self.prepare_output(run, step).await?;

        tracing::info!(%step, script = %script.display(), "running step");

        let mut command = Command::new(&script);
        command
            .envs(env.iter())
            .env(vars::STAGE, step.script_name())
            .env(vars::OUTPUT_DIR, &output_dir)
            .env(vars::REPORT, &report)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|source| AgentError::Spawn { step, source })?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AgentError::Timeout {
                step,
                after: self.timeout,
            })??;

        let outputs = match tokio::fs::read_to_string(&report).await {
            Ok(text) => parse_report(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Default::default(),
            Err(e) => return Err(e.into()),
        };
        let artifact = if has_entries(&output_dir).await? {
            Some(output_dir)
        } else {
            None
        };

        let outcome = AgentOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            artifact,
            outputs,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            skipped: false,
        };

        if outcome.success() {
            tracing::info!(%step, "step completed successfully");
        } else {
            tracing::warn!(%step, exit_code = outcome.exit_code, "step failed");
        }
        Ok(outcome)
    }
}
