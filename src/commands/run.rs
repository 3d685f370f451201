// ABOUTME: Run command implementation.
// ABOUTME: Drives one source change through the pipeline while holding the run lock.

use super::workspace::Workspace;
use async_trait::async_trait;
use edgeswap::agent::ShellAgent;
use edgeswap::approval::{ApprovalGateway, ApprovalPrompt, Notifier, NotifyError, TracingNotifier};
use edgeswap::config::Config;
use edgeswap::diagnostics::{Diagnostics, Warning};
use edgeswap::error::{Error, Result};
use edgeswap::events::{Decision, SourceChange};
use edgeswap::output::{Output, OutputMode};
use edgeswap::pipeline::{
    IgnoreReason, Orchestrator, PipelineContext, PipelineRun, RunLock, RunStatus, SourceFilter,
    SourceOutcome, StageOutcome,
};
use edgeswap::purge::PurgeController;
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;

const PURGE_QUEUE: usize = 8;

/// Run the pipeline once for a change on `branch` (default: the watched branch).
pub async fn run(
    config: &Config,
    commit: Option<String>,
    branch: Option<String>,
    decision: Option<Decision>,
    force: bool,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let ws = Workspace::open(config)?;
    let mut diag = Diagnostics::default();

    let production = ws.production().await?;
    output.progress(&format!(
        "Rolling out {} (production {})",
        config.service, production
    ));

    output.progress("  → Acquiring run lock...");
    let lock = RunLock::acquire(
        &ws.state_dir,
        &config.service,
        config.lock.stale_after,
        force,
    )?;

    let event = SourceChange::new(
        config.repository.clone(),
        branch.unwrap_or_else(|| config.branch.clone()),
        commit,
    );
    let result = run_locked(config, &ws, event, decision, &output).await;

    ws.save_edge(&mut diag);
    if let Err(e) = lock.release() {
        diag.warn(Warning::lock_release(format!(
            "failed to release run lock: {e}"
        )));
    }
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let run = result?;
    report(&run, &output);

    match run.status {
        RunStatus::Succeeded => {
            let version = run
                .version
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            output.success(&format!("Production now serves {version}"));
            Ok(())
        }
        RunStatus::Purged => {
            output.success(&format!(
                "Run {} rejected; staging removed, production unchanged",
                run.id
            ));
            Ok(())
        }
        status => Err(Error::RunFailed {
            run_id: run.id,
            status,
        }),
    }
}

async fn run_locked(
    config: &Config,
    ws: &Workspace,
    event: SourceChange,
    decision: Option<Decision>,
    output: &Output,
) -> Result<PipelineRun> {
    let (prompt_tx, prompt_rx) = mpsc::unbounded_channel();
    let gateway = ApprovalGateway::new(
        Arc::new(ForwardingNotifier { prompts: prompt_tx }),
        config.approval.console_url.clone(),
        config.recipients.clone(),
    )
    .with_timeout(config.approval.timeout);

    let mut agent =
        ShellAgent::new(config.stages_dir(), ws.work_dir()).with_timeout(config.agent.timeout);
    if !config.root.as_os_str().is_empty() {
        agent = agent.with_current_dir(&config.root);
    }

    let ctx = Arc::new(PipelineContext {
        service: config.service.clone(),
        params: ws.params.clone(),
        distributions: ws.distributions(),
        agent: Arc::new(agent),
        gateway,
        settings: config.pipeline_settings()?,
    });

    let registry = Arc::new(ws.registry()?);
    let controller = PurgeController::new(ws.distributions(), ws.params.clone(), registry.clone());
    let (purge_tx, purge_task) = controller.spawn(PURGE_QUEUE);

    let orchestrator = Arc::new(Orchestrator::new(
        ctx,
        registry,
        purge_tx,
        SourceFilter {
            repository: config.repository.clone(),
            branch: config.branch.clone(),
        },
    ));

    let decider = tokio::spawn(decide(
        orchestrator.clone(),
        prompt_rx,
        decision,
        output.mode(),
    ));

    output.progress(&format!("  → Source change {event}"));
    let outcome = orchestrator.on_source_changed(event).await;

    decider.abort();
    let _ = decider.await;
    drop(orchestrator);
    if let Err(e) = purge_task.await {
        tracing::warn!(error = %e, "purge controller task ended abnormally");
    }

    match outcome {
        SourceOutcome::Finished(run) => Ok(run),
        SourceOutcome::Untracked(run_id) => Err(Error::UnknownRun(run_id)),
        SourceOutcome::Ignored(IgnoreReason::OtherSource) => Err(Error::Ignored(format!(
            "only {}@{} is watched",
            config.repository, config.branch
        ))),
        SourceOutcome::Ignored(IgnoreReason::Duplicate) => Err(Error::Ignored(
            "the same commit was already handled".to_string(),
        )),
    }
}

/// Logs each prompt and hands it to the decision task.
struct ForwardingNotifier {
    prompts: mpsc::UnboundedSender<ApprovalPrompt>,
}

#[async_trait]
impl Notifier for ForwardingNotifier {
    async fn notify(&self, prompt: &ApprovalPrompt) -> std::result::Result<(), NotifyError> {
        TracingNotifier.notify(prompt).await?;
        self.prompts
            .send(prompt.clone())
            .map_err(|_| NotifyError::Delivery("decision task has stopped".to_string()))
    }
}

/// Answer each prompt from `preset` or, failing that, from stdin.
async fn decide(
    orchestrator: Arc<Orchestrator>,
    mut prompts: mpsc::UnboundedReceiver<ApprovalPrompt>,
    preset: Option<Decision>,
    mode: OutputMode,
) {
    let output = Output::new(mode);
    let mut lines = None;

    while let Some(prompt) = prompts.recv().await {
        output.progress(&format!("  → Staging ready: {}", prompt.link));
        output.progress(&format!("    {}", prompt.instructions));
        output.record("approval_prompt", &prompt);

        let decision = match preset {
            Some(decision) => decision,
            None => read_decision(lines.get_or_insert_with(stdin_lines), &output).await,
        };

        match orchestrator.on_approval_state_changed(&prompt.run_id, decision) {
            Ok(result) => {
                tracing::info!(run_id = %prompt.run_id, %decision, ?result, "decision recorded")
            }
            Err(e) => tracing::warn!(run_id = %prompt.run_id, error = %e, "decision not delivered"),
        }
    }
}

/// Lines from stdin, read on a plain thread so a pending read never holds up shutdown.
fn stdin_lines() -> mpsc::UnboundedReceiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn read_decision(
    lines: &mut mpsc::UnboundedReceiver<std::io::Result<String>>,
    output: &Output,
) -> Decision {
    loop {
        output.progress("    Accept or reject? [accept/reject]");
        match lines.recv().await {
            Some(Ok(line)) => match line.trim().parse::<Decision>() {
                Ok(decision) => return decision,
                Err(e) => output.warning(&e.to_string()),
            },
            Some(Err(e)) => {
                output.warning(&format!("failed to read decision ({e}); rejecting"));
                return Decision::Reject;
            }
            None => {
                output.warning("input closed before a decision; rejecting");
                return Decision::Reject;
            }
        }
    }
}

fn report(run: &PipelineRun, output: &Output) {
    for result in &run.stages {
        let mark = match result.outcome {
            StageOutcome::Succeeded => "✓",
            StageOutcome::Skipped => "-",
            StageOutcome::Failed | StageOutcome::ApprovalRejected => "✗",
        };
        let detail = result
            .message
            .as_deref()
            .or(result.artifact.as_deref())
            .unwrap_or_default();
        output.progress(&format!("  {mark} {:<8} {detail}", result.stage.to_string()));
    }
    output.record("run", run);

    if run.awaits_purge() {
        output.warning(&format!(
            "staging is still up; retry with `edgeswap purge {}`",
            run.id
        ));
    }
}
