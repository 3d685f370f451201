// ABOUTME: Orphans command implementation.
// ABOUTME: Lists and optionally removes staging distributions no run tracks.

use super::workspace::Workspace;
use edgeswap::config::Config;
use edgeswap::diagnostics::{Diagnostics, Warning};
use edgeswap::distribution::{cleanup_orphans, detect_orphans};
use edgeswap::error::Result;
use edgeswap::output::Output;
use edgeswap::pipeline::RunLock;
use edgeswap::types::DistributionId;

pub async fn orphans(config: &Config, cleanup: bool, mut output: Output) -> Result<()> {
    output.start_timer();
    let ws = Workspace::open(config)?;
    let mut diag = Diagnostics::default();

    let production = ws.production().await?;
    let known = ws.params.staging_distribution_id().await?;
    let found = detect_orphans(ws.edge.as_ref(), &production, known.as_ref()).await?;

    if found.is_empty() {
        output.success("No orphaned staging distributions");
        return Ok(());
    }

    let ids: Vec<DistributionId> = found.iter().map(|d| d.id.clone()).collect();
    for record in &found {
        let version = record
            .served_version()
            .map_or_else(|| "unknown version".to_string(), |v| v.to_string());
        output.progress(&format!("  {} ({version})", record.id));
    }
    output.record("orphans", &ids);

    if !cleanup {
        diag.warn(Warning::orphans(format!(
            "{} orphaned staging distribution(s); remove with --cleanup",
            ids.len()
        )));
        for warning in diag.warnings() {
            output.warning(&warning.message);
        }
        return Ok(());
    }

    let lock = RunLock::acquire(
        &ws.state_dir,
        &config.service,
        config.lock.stale_after,
        false,
    )?;
    let result = cleanup_orphans(&ws.distributions(), &production, &ids).await;

    ws.save_edge(&mut diag);
    if let Err(e) = lock.release() {
        diag.warn(Warning::lock_release(format!(
            "failed to release run lock: {e}"
        )));
    }
    for failure in &result.failed {
        diag.warn(Warning::orphans(format!(
            "could not remove {}: {}",
            failure.id, failure.error
        )));
    }
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    output.success(&format!(
        "Removed {} of {} orphaned staging distribution(s)",
        result.removed.len(),
        ids.len()
    ));
    Ok(())
}
