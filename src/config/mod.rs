// ABOUTME: Configuration types and parsing for edgeswap.yml.
// ABOUTME: Handles YAML parsing, discovery, defaults, and stage environment entries.

mod deserialize;
mod env_value;
mod init;

pub use env_value::{EnvValue, resolve_stage_env};
pub use init::init_config;

use crate::error::{Error, Result};
use crate::pipeline::PipelineSettings;
use crate::types::{HeaderPredicate, ServiceName};
use deserialize::{deserialize_recipients, deserialize_service_name};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "edgeswap.yml";
pub const CONFIG_FILENAME_ALT: &str = "edgeswap.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".edgeswap/config.yml";

pub const DEFAULT_CONSOLE_URL: &str =
    "https://console.aws.amazon.com/cloudfront/v4/home#/distributions/";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_service_name")]
    pub service: ServiceName,

    /// Source repository whose changes trigger a rollout.
    pub repository: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(deserialize_with = "deserialize_recipients")]
    pub recipients: NonEmpty<String>,

    /// Directory holding the `source`, `build` and `deploy` step scripts.
    #[serde(default = "default_stages_dir")]
    pub stages_dir: PathBuf,

    /// Directory holding params, edge snapshot, objects, run archive and lock.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub continuous_deployment: ContinuousDeploymentConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub approval: ApprovalConfig,

    #[serde(default)]
    pub deploy: DeployConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    /// Directory the config was loaded from; relative paths resolve against it.
    #[serde(skip)]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContinuousDeploymentConfig {
    #[serde(default)]
    pub single_header: HeaderPredicate,

    #[serde(default = "default_true")]
    pub staging_cleanup: bool,
}

impl Default for ContinuousDeploymentConfig {
    fn default() -> Self {
        Self {
            single_header: HeaderPredicate::default(),
            staging_cleanup: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            timeout: default_agent_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_console_url")]
    pub console_url: String,

    /// Unset means the run waits for a decision indefinitely.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            console_url: default_console_url(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_stale_after", with = "humantime_serde")]
    pub stale_after: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after: default_stale_after(),
        }
    }
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_stages_dir() -> PathBuf {
    PathBuf::from(".edgeswap/stages")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".edgeswap/state")
}

fn default_true() -> bool {
    true
}

fn default_agent_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_console_url() -> String {
    DEFAULT_CONSOLE_URL.to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_stale_after() -> Duration {
    Duration::from_secs(60 * 60)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; relative paths resolve against `root`.
    pub fn load(path: &Path, root: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.root = root.to_path_buf();
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading configuration");
                return Self::load(path, dir);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        if self.repository.trim().is_empty() {
            return Err(Error::InvalidConfig("repository cannot be empty".into()));
        }
        if self.branch.trim().is_empty() {
            return Err(Error::InvalidConfig("branch cannot be empty".into()));
        }
        if self.deploy.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "deploy.max_attempts must be at least 1".into(),
            ));
        }
        env_value::check_stage_var_names(&self.env)?;
        Ok(())
    }

    pub fn stages_dir(&self) -> PathBuf {
        self.root.join(&self.stages_dir)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(&self.state_dir)
    }

    /// Pipeline settings with `env:` entries resolved against the process environment.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        Ok(PipelineSettings {
            deploy_attempts: self.deploy.max_attempts,
            retry_delay: self.deploy.retry_delay,
            env: resolve_stage_env(&self.env)?,
        })
    }

    pub fn template() -> Self {
        Config {
            service: ServiceName::new("my-frontend").expect("template name is valid"),
            repository: "my-org/my-frontend".to_string(),
            branch: default_branch(),
            recipients: NonEmpty::new("team@example.com".to_string()),
            stages_dir: default_stages_dir(),
            state_dir: default_state_dir(),
            continuous_deployment: ContinuousDeploymentConfig::default(),
            agent: AgentConfig::default(),
            approval: ApprovalConfig::default(),
            deploy: DeployConfig::default(),
            lock: LockConfig::default(),
            env: HashMap::new(),
            root: PathBuf::new(),
        }
    }
}
