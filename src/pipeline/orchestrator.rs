// ABOUTME: Pipeline orchestrator: event filtering, queueing, and stage sequencing.
// ABOUTME: Drives one rollout at a time per service and hands rejections to the purge controller.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::context::PipelineContext;
use super::error::StageError;
use super::registry::RunRegistry;
use super::rollout::{Decided, Rollout};
use super::run::{PipelineRun, RunPhase, Stage, StageOutcome};
use crate::approval::{DecideResult, NotifyError};
use crate::events::{Decision, SourceChange};
use crate::purge::PurgeRequest;
use crate::types::{DistributionId, RunId};

/// Repository and branch whose changes start runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFilter {
    pub repository: String,
    pub branch: String,
}

impl SourceFilter {
    pub fn matches(&self, event: &SourceChange) -> bool {
        event.repository == self.repository && event.branch == self.branch
    }
}

/// Why a source event did not start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OtherSource,
    Duplicate,
}

/// What happened to a source event.
#[derive(Debug, Clone)]
pub enum SourceOutcome {
    Ignored(IgnoreReason),
    Finished(PipelineRun),
    /// The run record disappeared before it reached a terminal status.
    Untracked(RunId),
}

impl SourceOutcome {
    pub fn run(&self) -> Option<&PipelineRun> {
        match self {
            SourceOutcome::Finished(run) => Some(run),
            SourceOutcome::Ignored(_) | SourceOutcome::Untracked(_) => None,
        }
    }
}

pub struct Orchestrator {
    ctx: Arc<PipelineContext>,
    registry: Arc<RunRegistry>,
    purge: mpsc::Sender<PurgeRequest>,
    filter: SourceFilter,
    // Fair mutex: queued events acquire the slot in arrival order.
    slot: tokio::sync::Mutex<()>,
    seen: Mutex<HashSet<(String, String, String)>>,
    queued: AtomicUsize,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("service", &self.ctx.service)
            .field("filter", &self.filter)
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        ctx: Arc<PipelineContext>,
        registry: Arc<RunRegistry>,
        purge: mpsc::Sender<PurgeRequest>,
        filter: SourceFilter,
    ) -> Self {
        Self {
            ctx,
            registry,
            purge,
            filter,
            slot: tokio::sync::Mutex::new(()),
            seen: Mutex::new(HashSet::new()),
            queued: AtomicUsize::new(0),
        }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    /// Events waiting for the run slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Handle a source change: filter, de-duplicate, then run once the slot is free.
    ///
    /// Resolves when the run reaches a terminal status.
    pub async fn on_source_changed(&self, event: SourceChange) -> SourceOutcome {
        if !self.filter.matches(&event) {
            tracing::debug!(source = %event, "ignoring change outside the watched branch");
            return SourceOutcome::Ignored(IgnoreReason::OtherSource);
        }
        if let Some(key) = event.dedupe_key()
            && !self.seen.lock().insert(key)
        {
            tracing::info!(source = %event, "ignoring redelivered source change");
            return SourceOutcome::Ignored(IgnoreReason::Duplicate);
        }

        self.queued.fetch_add(1, Ordering::SeqCst);
        let _slot = self.slot.lock().await;
        self.queued.fetch_sub(1, Ordering::SeqCst);

        let run_id = self.registry.next_run_id(&self.ctx.service);
        self.registry.insert(PipelineRun::new(
            run_id.clone(),
            self.ctx.service.clone(),
            event.clone(),
        ));
        tracing::info!(run_id = %run_id, service = %self.ctx.service, source = %event, "run started");

        self.execute(Rollout::new(run_id.clone(), event)).await;

        let Some(run) = self.registry.wait_terminal(&run_id).await else {
            tracing::error!(run_id = %run_id, "run record missing from the registry");
            return SourceOutcome::Untracked(run_id);
        };
        tracing::info!(run_id = %run_id, status = %run.status, "run finished");
        SourceOutcome::Finished(run)
    }

    /// Route an approval decision to the waiting run.
    pub fn on_approval_state_changed(
        &self,
        run_id: &RunId,
        decision: Decision,
    ) -> Result<DecideResult, NotifyError> {
        self.ctx.gateway.decide(run_id, decision)
    }

    /// Feed source events from a channel; each waits its turn for the slot.
    pub fn listen(self: Arc<Self>, mut events: mpsc::Receiver<SourceChange>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut runs = tokio::task::JoinSet::new();
            while let Some(event) = events.recv().await {
                let orchestrator = self.clone();
                runs.spawn(async move { orchestrator.on_source_changed(event).await });
                // Give the new task a chance to queue before the next event.
                tokio::task::yield_now().await;
            }
            while runs.join_next().await.is_some() {}
        })
    }

    /// Staging distributions that earlier rejected runs have not purged yet.
    fn staging_awaiting_purge(&self) -> Vec<DistributionId> {
        self.registry
            .list(&self.ctx.service)
            .iter()
            .filter_map(PurgeRequest::for_run)
            .map(|request| request.staging)
            .collect()
    }

    fn fail(&self, run_id: &RunId, stage: Stage, error: &StageError) {
        tracing::error!(run_id = %run_id, %stage, kind = ?error.kind(), %error, "stage failed");
        self.registry.update(run_id, |run| run.fail(stage, error));
    }

    fn advance(&self, run_id: &RunId, stage: Stage, artifact: Option<String>, next: (Stage, RunPhase)) {
        tracing::info!(run_id = %run_id, %stage, "stage succeeded");
        self.registry.update(run_id, |run| {
            run.record(stage, StageOutcome::Succeeded, artifact, None);
            run.enter(next.0, next.1);
        });
    }

    async fn execute(&self, rollout: Rollout<super::state::Triggered>) {
        let ctx = self.ctx.as_ref();
        let run_id = rollout.run_id().clone();

        // Source
        let sourced = match rollout.source(ctx).await {
            Ok(sourced) => sourced,
            Err(e) => return self.fail(&run_id, Stage::Source, &e),
        };
        self.advance(
            &run_id,
            Stage::Source,
            sourced.source_change().commit.clone(),
            (
                Stage::Build,
                RunPhase::Build {
                    previous: sourced.previous_version().clone(),
                },
            ),
        );

        // Build
        let mut built = match sourced.build(ctx).await {
            Ok(built) => built,
            Err(e) => return self.fail(&run_id, Stage::Build, &e),
        };
        let version = built.version().clone();
        self.registry.update(&run_id, |run| run.version = Some(version.clone()));
        self.advance(
            &run_id,
            Stage::Build,
            Some(version.object_prefix()),
            (
                Stage::Deploy,
                RunPhase::Deploy {
                    version: version.clone(),
                    attempt: 1,
                },
            ),
        );

        // Deploy, retrying provisioning failures
        let attempts = ctx.settings.deploy_attempts.max(1);
        let mut attempt = 1;
        let held = self.staging_awaiting_purge();
        let deployed = loop {
            match built.deploy(ctx, &held).await {
                Ok(deployed) => break deployed,
                Err((back, e)) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        run_id = %run_id,
                        attempt,
                        error = %e,
                        "deploy failed, retrying"
                    );
                    attempt += 1;
                    let version = version.clone();
                    self.registry.update(&run_id, |run| {
                        run.enter(Stage::Deploy, RunPhase::Deploy { version, attempt })
                    });
                    tokio::time::sleep(ctx.settings.retry_delay).await;
                    built = back;
                }
                Err((_, e)) => return self.fail(&run_id, Stage::Deploy, &e),
            }
        };
        let staged = deployed.staged().clone();
        tracing::info!(run_id = %run_id, stage = %Stage::Deploy, "stage succeeded");
        self.registry.update(&run_id, |run| {
            run.record(
                Stage::Deploy,
                StageOutcome::Succeeded,
                Some(staged.staging.to_string()),
                None,
            );
            run.production = Some(staged.production.clone());
            run.staging = Some(staged.staging.clone());
            run.policy = Some(staged.policy.clone());
        });

        // Approve
        let awaiting = match deployed.request_approval(ctx).await {
            Ok(awaiting) => awaiting,
            Err((_, e)) => return self.fail(&run_id, Stage::Approve, &e),
        };
        let link = awaiting.link().to_string();
        self.registry.update(&run_id, |run| {
            run.enter(
                Stage::Approve,
                RunPhase::Approve {
                    version: version.clone(),
                    staging: staged.staging.clone(),
                    link,
                },
            )
        });

        let approved = match awaiting.await_decision().await {
            Decided::Approved(approved) => approved,
            Decided::Rejected(rejected) => {
                let expired = rejected.expired();
                tracing::info!(run_id = %run_id, expired, "approval rejected, purging staging");
                self.registry.update(&run_id, |run| {
                    run.roll_back(version.clone(), staged.staging.clone(), expired)
                });
                let request = rejected.purge_request(&ctx.service);
                if self.purge.send(request).await.is_err() {
                    tracing::error!(run_id = %run_id, "purge controller is not running");
                    self.registry.update(&run_id, |run| {
                        run.mark_purge_failed("purge controller is not running".to_string())
                    });
                }
                return;
            }
        };
        self.advance(
            &run_id,
            Stage::Approve,
            None,
            (
                Stage::Promote,
                RunPhase::Promote {
                    version: version.clone(),
                    staging: staged.staging.clone(),
                },
            ),
        );

        // Promote
        let promoted = match approved.promote(ctx).await {
            Ok(promoted) => promoted,
            Err(e) => return self.fail(&run_id, Stage::Promote, &e),
        };
        self.advance(
            &run_id,
            Stage::Promote,
            Some(promoted.staged().production_revision.to_string()),
            (
                Stage::Cleanup,
                RunPhase::Cleanup {
                    version: version.clone(),
                    staging: staged.staging.clone(),
                },
            ),
        );

        // Cleanup or done
        let completed = match promoted.finish(ctx).await {
            Ok(completed) => completed,
            Err(e) => return self.fail(&run_id, Stage::Cleanup, &e),
        };
        let cleaned_up = completed.cleaned_up();
        self.registry.update(&run_id, |run| {
            let outcome = if cleaned_up {
                StageOutcome::Succeeded
            } else {
                StageOutcome::Skipped
            };
            run.record(Stage::Cleanup, outcome, None, None);
            if cleaned_up {
                run.staging = None;
            }
            run.succeed(completed.version().clone(), cleaned_up);
        });
        tracing::info!(run_id = %run_id, version = %version, cleaned_up, "rollout complete");
    }
}
