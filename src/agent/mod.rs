// ABOUTME: Build/execution agent that runs pipeline steps with an environment map.
// ABOUTME: Defines the agent trait, step names, outcomes, and the shell implementation.

mod env;
mod shell;

pub use env::{StageEnv, vars};
pub use shell::ShellAgent;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Steps the agent executes on behalf of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Checkout. Optional.
    Source,
    /// Produces the artifact and reports its version.
    Build,
    /// Extra deploy-time work before publishing. Optional.
    Deploy,
}

impl Step {
    /// Script name under the stages directory.
    pub fn script_name(&self) -> &'static str {
        match self {
            Step::Source => "source",
            Step::Build => "build",
            Step::Deploy => "deploy",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.script_name())
    }
}

/// Result of running one step.
#[derive(Debug, Clone, Default)]
pub struct AgentOutcome {
    pub exit_code: i32,
    /// Directory holding the produced files, when any were produced.
    pub artifact: Option<PathBuf>,
    /// `key=value` pairs the step reported.
    pub outputs: BTreeMap<String, String>,
    pub stdout: String,
    pub stderr: String,
    /// No script exists for the step.
    pub skipped: bool,
}

impl AgentOutcome {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{step} step timed out after {after:?}")]
    Timeout { step: Step, after: Duration },

    #[error("failed to start {step} step: {source}")]
    Spawn {
        step: Step,
        #[source]
        source: std::io::Error,
    },

    #[error("agent I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Executes pipeline steps.
#[async_trait]
pub trait StageAgent: Send + Sync {
    async fn run(&self, step: Step, env: &StageEnv) -> Result<AgentOutcome, AgentError>;
}

/// Parse `key=value` lines, skipping blanks and `#` comments.
pub(crate) fn parse_report(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_parsing_ignores_noise() {
        let outputs = parse_report("# build report\nversion = v2\n\nnot a pair\nsize=12\n");
        assert_eq!(outputs.get("version").map(String::as_str), Some("v2"));
        assert_eq!(outputs.get("size").map(String::as_str), Some("12"));
        assert_eq!(outputs.len(), 2);
    }

    #[test]
    fn step_script_names() {
        assert_eq!(Step::Source.script_name(), "source");
        assert_eq!(Step::Build.script_name(), "build");
        assert_eq!(Step::Deploy.script_name(), "deploy");
    }
}
