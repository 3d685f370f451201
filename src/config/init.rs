// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates edgeswap.yml template files.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ServiceName;

use super::{CONFIG_FILENAME, Config};

pub fn init_config(
    dir: &Path,
    service: Option<&str>,
    repository: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();

    if let Some(s) = service {
        config.service = ServiceName::new(s).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    if let Some(r) = repository {
        if r.trim().is_empty() {
            return Err(Error::InvalidConfig("repository cannot be empty".into()));
        }
        config.repository = r.trim().to_string();
    }

    let yaml = generate_template_yaml(&config);
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    format!(
        r#"service: {}
repository: {}
branch: {}
recipients:
  - {}

# Step scripts: {}/source, {}/build, {}/deploy
# stages_dir: {}
# state_dir: {}

continuous_deployment:
  single_header:
    header: {}
    value: "{}"
  staging_cleanup: {}

# approval:
#   console_url: {}
#   timeout: 2h

# deploy:
#   max_attempts: {}
#   retry_delay: 5s

# env:
#   API_URL: https://api.example.com
#   API_TOKEN:
#     env: API_TOKEN
"#,
        config.service,
        config.repository,
        config.branch,
        config.recipients.first(),
        config.stages_dir.display(),
        config.stages_dir.display(),
        config.stages_dir.display(),
        config.stages_dir.display(),
        config.state_dir.display(),
        config.continuous_deployment.single_header.header(),
        config.continuous_deployment.single_header.value(),
        config.continuous_deployment.staging_cleanup,
        config.approval.console_url,
        config.deploy.max_attempts,
    )
}
