// ABOUTME: Rollback/purge controller tearing staging down after a rejection.
// ABOUTME: Consumes purge requests from a channel; every step is safe to repeat.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use std::sync::Arc;

use crate::distribution::{DistributionError, DistributionManager};
use crate::pipeline::{PipelineRun, RunPhase, RunRegistry};
use crate::store::{ParamStore, StoreError};
use crate::types::{DistributionId, PolicyId, RunId, ServiceName};

/// Ask the controller to remove a rejected run's staging resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeRequest {
    pub run_id: RunId,
    pub service: ServiceName,
    pub production: DistributionId,
    pub staging: DistributionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyId>,
}

impl PurgeRequest {
    /// Rebuild the request for a run still waiting on its purge, e.g. for redelivery.
    pub fn for_run(run: &PipelineRun) -> Option<Self> {
        if !run.awaits_purge() {
            return None;
        }
        let staging = match &run.phase {
            RunPhase::RolledBack { staging, .. } => staging.clone(),
            _ => run.staging.clone()?,
        };
        Some(Self {
            run_id: run.id.clone(),
            service: run.service.clone(),
            production: run.production.clone()?,
            staging,
            policy: run.policy.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PurgeError {
    #[error("staging teardown failed: {0}")]
    Distribution(#[from] DistributionError),

    #[error("config store update failed: {0}")]
    Store(#[from] StoreError),

    #[error("request for service {found} sent to controller for {expected}")]
    WrongService {
        expected: ServiceName,
        found: ServiceName,
    },
}

pub struct PurgeController {
    distributions: DistributionManager,
    params: ParamStore,
    registry: Arc<RunRegistry>,
}

impl std::fmt::Debug for PurgeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurgeController")
            .field("service", self.params.service())
            .finish_non_exhaustive()
    }
}

impl PurgeController {
    pub fn new(
        distributions: DistributionManager,
        params: ParamStore,
        registry: Arc<RunRegistry>,
    ) -> Self {
        Self {
            distributions,
            params,
            registry,
        }
    }

    /// Tear down staging, clear the staging key, and mark the run purged.
    ///
    /// On failure the run is marked failed and retryable; only redelivering
    /// the request retries it.
    pub async fn handle(&self, request: &PurgeRequest) -> Result<(), PurgeError> {
        match self.purge(request).await {
            Ok(()) => {
                let staging = request.staging.clone();
                if self
                    .registry
                    .update(&request.run_id, |run| run.mark_purged(staging))
                    .is_none()
                {
                    tracing::warn!(run_id = %request.run_id, "purged staging for an unknown run");
                }
                tracing::info!(
                    run_id = %request.run_id,
                    distribution = %request.staging,
                    "run purged"
                );
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.registry
                    .update(&request.run_id, |run| run.mark_purge_failed(message));
                tracing::error!(
                    run_id = %request.run_id,
                    distribution = %request.staging,
                    error = %e,
                    "purge failed, redeliver to retry"
                );
                Err(e)
            }
        }
    }

    async fn purge(&self, request: &PurgeRequest) -> Result<(), PurgeError> {
        if &request.service != self.params.service() {
            return Err(PurgeError::WrongService {
                expected: self.params.service().clone(),
                found: request.service.clone(),
            });
        }

        self.distributions
            .delete_staging(&request.production, &request.staging, request.policy.as_ref())
            .await?;

        // Only clear the slot if it still names this run's staging.
        if self.params.staging_distribution_id().await?.as_ref() == Some(&request.staging) {
            self.params.set_staging_distribution_id(None).await?;
        }
        Ok(())
    }

    /// Process requests until every sender is dropped.
    pub async fn run(self, mut requests: mpsc::Receiver<PurgeRequest>) {
        while let Some(request) = requests.recv().await {
            // Failures are recorded on the run; the loop keeps serving.
            let _ = self.handle(&request).await;
        }
        tracing::debug!("purge controller stopped");
    }

    /// Start the controller on its own task.
    pub fn spawn(self, capacity: usize) -> (mpsc::Sender<PurgeRequest>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }
}
