// ABOUTME: Purge command implementation.
// ABOUTME: Redelivers the purge of a rejected run whose teardown failed or never ran.

use super::workspace::Workspace;
use edgeswap::config::Config;
use edgeswap::diagnostics::{Diagnostics, Warning};
use edgeswap::error::{Error, Result};
use edgeswap::output::Output;
use edgeswap::pipeline::{RunLock, RunStatus};
use edgeswap::purge::{PurgeController, PurgeRequest};
use edgeswap::types::RunId;
use std::sync::Arc;

pub async fn purge(config: &Config, run_id: &str, mut output: Output) -> Result<()> {
    output.start_timer();
    let ws = Workspace::open(config)?;
    let mut diag = Diagnostics::default();

    let registry = Arc::new(ws.registry()?);
    let run_id = RunId::new(run_id);
    let run = registry
        .get(&run_id)
        .ok_or_else(|| Error::UnknownRun(run_id.clone()))?;

    if run.status == RunStatus::Purged {
        output.success(&format!("Run {run_id} is already purged"));
        return Ok(());
    }
    let request = PurgeRequest::for_run(&run).ok_or(Error::NothingToPurge {
        run_id: run_id.clone(),
        status: run.status,
    })?;

    let lock = RunLock::acquire(
        &ws.state_dir,
        &config.service,
        config.lock.stale_after,
        false,
    )?;

    output.progress(&format!(
        "  → Removing staging distribution {} for run {}...",
        request.staging, run_id
    ));
    let controller = PurgeController::new(ws.distributions(), ws.params.clone(), registry);
    let result = controller.handle(&request).await;

    ws.save_edge(&mut diag);
    if let Err(e) = lock.release() {
        diag.warn(Warning::lock_release(format!(
            "failed to release run lock: {e}"
        )));
    }
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    result?;
    output.success(&format!("Purged run {run_id}"));
    Ok(())
}
