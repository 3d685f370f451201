// ABOUTME: Collaborators and settings shared by every stage of a run.
// ABOUTME: Built once per service and handed to each transition.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::StageAgent;
use crate::approval::ApprovalGateway;
use crate::distribution::DistributionManager;
use crate::store::ParamStore;
use crate::types::ServiceName;

/// Tunables for a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Deploy attempts before a provisioning failure fails the run.
    pub deploy_attempts: u32,
    pub retry_delay: Duration,
    /// Extra variables for every step.
    pub env: BTreeMap<String, String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            deploy_attempts: 3,
            retry_delay: Duration::from_secs(5),
            env: BTreeMap::new(),
        }
    }
}

/// Everything a stage needs to do its work.
pub struct PipelineContext {
    pub service: ServiceName,
    pub params: ParamStore,
    pub distributions: DistributionManager,
    pub agent: Arc<dyn StageAgent>,
    pub gateway: ApprovalGateway,
    pub settings: PipelineSettings,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("service", &self.service)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
