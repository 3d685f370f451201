// ABOUTME: Status command implementation.
// ABOUTME: Shows deployment parameters, what each distribution serves, and recent runs.

use super::workspace::Workspace;
use edgeswap::config::Config;
use edgeswap::distribution::EdgeOps;
use edgeswap::error::Result;
use edgeswap::output::Output;
use edgeswap::pipeline::PipelineRun;
use edgeswap::store::DeploymentParams;
use edgeswap::types::{DistributionId, PolicyId, Version};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    params: DeploymentParams,
    production: Option<DistributionView>,
    staging: Option<DistributionView>,
    runs: Vec<PipelineRun>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DistributionView {
    id: DistributionId,
    served_version: Option<Version>,
    config_revision: String,
    policy: Option<PolicyId>,
    policy_enabled: Option<bool>,
}

pub async fn status(config: &Config, limit: usize, output: Output) -> Result<()> {
    let ws = Workspace::open(config)?;
    ws.production().await?;
    let params = ws.params.snapshot().await?;

    let production = describe(&ws, &params.production_distribution_id).await?;
    let staging = match &params.staging_distribution_id {
        Some(id) => describe(&ws, id).await?,
        None => None,
    };

    let mut runs = ws.registry()?.list(&config.service);
    let skip = runs.len().saturating_sub(limit);
    let runs = runs.split_off(skip);

    output.progress(&format!("Service:    {}", config.service));
    output.progress(&format!("Version:    {}", params.frontend_version));
    output.progress(&format!(
        "Production: {}",
        line(&params.production_distribution_id, production.as_ref())
    ));
    output.progress(&format!(
        "Staging:    {}",
        params
            .staging_distribution_id
            .as_ref()
            .map_or_else(|| "none".to_string(), |id| line(id, staging.as_ref()))
    ));
    output.progress(&format!(
        "Cleanup:    {}",
        if params.staging_cleanup_enabled {
            "enabled"
        } else {
            "disabled"
        }
    ));
    output.progress(&format!(
        "Header:     {}",
        params.single_header_predicate
    ));

    if !runs.is_empty() {
        output.progress("Runs:");
        for run in &runs {
            let version = run
                .version
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string());
            output.progress(&format!(
                "  {}  {:<9} {:<12} {}",
                run.id,
                run.status.to_string(),
                version,
                run.started_at.format("%Y-%m-%d %H:%M:%S")
            ));
        }
    }

    output.record(
        "status",
        &StatusReport {
            params,
            production,
            staging,
            runs,
        },
    );
    Ok(())
}

async fn describe(ws: &Workspace, id: &DistributionId) -> Result<Option<DistributionView>> {
    let record = match ws.edge.get_distribution(id).await {
        Ok(record) => record,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let policy_enabled = match &record.config.continuous_deployment_policy {
        Some(policy) => match ws.edge.get_policy(policy).await {
            Ok(policy) => Some(policy.config.enabled),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };

    Ok(Some(DistributionView {
        served_version: record.served_version(),
        config_revision: record.config_revision.to_string(),
        policy: record.config.continuous_deployment_policy.clone(),
        policy_enabled,
        id: record.id,
    }))
}

fn line(id: &DistributionId, view: Option<&DistributionView>) -> String {
    let Some(view) = view else {
        return format!("{id} (missing from edge)");
    };
    let mut text = match &view.served_version {
        Some(version) => format!("{id} serving {version}"),
        None => format!("{id}"),
    };
    if let Some(policy) = &view.policy {
        let state = match view.policy_enabled {
            Some(true) => "enabled",
            Some(false) => "disabled",
            None => "missing",
        };
        text.push_str(&format!(", policy {policy} ({state})"));
    }
    text
}
