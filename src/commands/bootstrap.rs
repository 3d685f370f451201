// ABOUTME: Bootstrap command implementation.
// ABOUTME: Provisions the production distribution and seeds the deployment parameters.

use super::workspace::Workspace;
use edgeswap::config::Config;
use edgeswap::diagnostics::Diagnostics;
use edgeswap::distribution::{DistributionRecord, EdgeOps};
use edgeswap::error::{Error, Result};
use edgeswap::objects::{ObjectStore, publish_artifact};
use edgeswap::output::Output;
use edgeswap::store::DeploymentParams;
use edgeswap::types::{DistributionId, Version};
use std::path::Path;

/// Create production for `version` and write every parameter.
pub async fn bootstrap(
    config: &Config,
    version: &str,
    artifact: Option<&Path>,
    force: bool,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let version = Version::new(version)?;
    let ws = Workspace::open(config)?;
    let mut diag = Diagnostics::default();

    let existing = match ws.params.production_distribution_id().await {
        Ok(_) if !force => return Err(Error::AlreadyBootstrapped(config.service.to_string())),
        Ok(id) => Some(id),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };

    if let Some(dir) = artifact {
        output.progress(&format!("  → Publishing {} as {}...", dir.display(), version));
        let report = publish_artifact(ws.objects.as_ref(), &version, dir).await?;
        output.progress(&format!(
            "  → Published {} object(s), {} bytes under {}",
            report.objects, report.bytes, report.prefix
        ));
    } else if !ws.objects.exists(&version.object_prefix()).await? {
        output.warning(&format!(
            "nothing is published under {}; production will answer 404",
            version.object_prefix()
        ));
    }

    let production = match existing {
        Some(id) => repoint_production(&ws, &id, &version).await?,
        None => ws
            .edge
            .provision_production(&version, &format!("{} production", config.service)),
    };
    output.progress(&format!(
        "  → Production distribution {} serves {}",
        production.id, version
    ));

    ws.params
        .seed(&DeploymentParams {
            frontend_version: version.clone(),
            production_distribution_id: production.id.clone(),
            staging_distribution_id: None,
            staging_cleanup_enabled: config.continuous_deployment.staging_cleanup,
            single_header_predicate: config.continuous_deployment.single_header.clone(),
        })
        .await?;

    ws.save_edge(&mut diag);
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    tracing::info!(service = %config.service, distribution = %production.id, %version, "service bootstrapped");
    output.success(&format!("Bootstrapped {} at {}", config.service, version));
    Ok(())
}

/// Point an existing production distribution at `version` again.
///
/// A production distribution that vanished from the edge is provisioned anew.
async fn repoint_production(
    ws: &Workspace,
    id: &DistributionId,
    version: &Version,
) -> Result<DistributionRecord> {
    let current = match ws.edge.get_distribution(id).await {
        Ok(record) => record,
        Err(e) if e.is_not_found() => {
            tracing::warn!(distribution = %id, "production distribution missing, provisioning a new one");
            return Ok(ws.edge.provision_production(version, "production"));
        }
        Err(e) => return Err(e.into()),
    };

    let mut config = current.config.clone();
    config.origin_path = version.origin_path();
    Ok(ws
        .edge
        .update_distribution(id, config, &current.config_revision)
        .await?)
}
