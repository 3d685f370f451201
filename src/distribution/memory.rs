// ABOUTME: In-process edge provider with etag-style revisions and fault injection.
// ABOUTME: Persists to a JSON snapshot so the CLI can keep state between runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use super::DistributionError;
use super::edge::{
    ContinuousDeploymentPolicy, DistributionConfig, DistributionRecord, EdgeOps, PolicyConfig,
};
use crate::types::{ConfigRevision, DistributionId, PolicyId, Version};

/// Provider operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOp {
    CopyDistribution,
    UpdateDistribution,
    UpdateWithStagingConfig,
    DeleteDistribution,
    CreatePolicy,
    UpdatePolicy,
    DeletePolicy,
}

impl fmt::Display for EdgeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeOp::CopyDistribution => "CopyDistribution",
            EdgeOp::UpdateDistribution => "UpdateDistribution",
            EdgeOp::UpdateWithStagingConfig => "UpdateDistributionWithStagingConfig",
            EdgeOp::DeleteDistribution => "DeleteDistribution",
            EdgeOp::CreatePolicy => "CreateContinuousDeploymentPolicy",
            EdgeOp::UpdatePolicy => "UpdateContinuousDeploymentPolicy",
            EdgeOp::DeletePolicy => "DeleteContinuousDeploymentPolicy",
        };
        f.write_str(name)
    }
}

/// Error an injected fault produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Provisioning,
    Unavailable,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EdgeState {
    last_revision: u64,
    last_id: u64,
    distributions: BTreeMap<DistributionId, DistributionRecord>,
    policies: BTreeMap<PolicyId, ContinuousDeploymentPolicy>,
}

impl EdgeState {
    fn next_revision(&mut self) -> ConfigRevision {
        self.last_revision += 1;
        ConfigRevision::new(format!("E{}", self.last_revision))
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.last_id += 1;
        format!("{prefix}{:06}", self.last_id)
    }

    fn distribution(&self, id: &DistributionId) -> Result<&DistributionRecord, DistributionError> {
        self.distributions
            .get(id)
            .ok_or_else(|| DistributionError::NotFound(format!("distribution {id}")))
    }

    fn policy(&self, id: &PolicyId) -> Result<&ContinuousDeploymentPolicy, DistributionError> {
        self.policies
            .get(id)
            .ok_or_else(|| DistributionError::NotFound(format!("policy {id}")))
    }

    fn check_distribution(
        &self,
        id: &DistributionId,
        if_match: &ConfigRevision,
    ) -> Result<&DistributionRecord, DistributionError> {
        let record = self.distribution(id)?;
        if &record.config_revision != if_match {
            return Err(DistributionError::Conflict {
                resource: format!("distribution {id}"),
                expected: if_match.clone(),
                found: record.config_revision.clone(),
            });
        }
        Ok(record)
    }

    fn check_policy(
        &self,
        id: &PolicyId,
        if_match: &ConfigRevision,
    ) -> Result<&ContinuousDeploymentPolicy, DistributionError> {
        let policy = self.policy(id)?;
        if &policy.revision != if_match {
            return Err(DistributionError::Conflict {
                resource: format!("policy {id}"),
                expected: if_match.clone(),
                found: policy.revision.clone(),
            });
        }
        Ok(policy)
    }

    fn validate_policy(&self, config: &PolicyConfig) -> Result<(), DistributionError> {
        let staging = self.distribution(&config.staging_distribution)?;
        if !staging.config.staging {
            return Err(DistributionError::Provider(format!(
                "distribution {} is not a staging distribution",
                staging.id
            )));
        }
        Ok(())
    }

    fn validate_attachment(&self, config: &DistributionConfig) -> Result<(), DistributionError> {
        if let Some(policy) = &config.continuous_deployment_policy {
            if config.staging {
                return Err(DistributionError::Provider(
                    "a staging distribution cannot carry a policy".to_string(),
                ));
            }
            self.policy(policy)?;
        }
        Ok(())
    }
}

/// Local stand-in for the edge provider.
#[derive(Debug, Default)]
pub struct MemoryEdge {
    state: Mutex<EdgeState>,
    faults: Mutex<Vec<(EdgeOp, Fault)>>,
}

impl MemoryEdge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a production distribution serving `version`.
    pub fn provision_production(&self, version: &Version, comment: &str) -> DistributionRecord {
        let mut state = self.state.lock();
        let id = DistributionId::new(state.next_id("EPROD"));
        let record = DistributionRecord {
            id: id.clone(),
            config_revision: state.next_revision(),
            config: DistributionConfig {
                origin_path: version.origin_path(),
                staging: false,
                continuous_deployment_policy: None,
                source_distribution: None,
                comment: comment.to_string(),
                enabled: true,
            },
        };
        state.distributions.insert(id, record.clone());
        record
    }

    /// Make the next `op` fail with `fault`. Faults queue per operation.
    pub fn inject_fault(&self, op: EdgeOp, fault: Fault) {
        self.faults.lock().push((op, fault));
    }

    fn take_fault(&self, op: EdgeOp) -> Result<(), DistributionError> {
        let mut faults = self.faults.lock();
        let Some(index) = faults.iter().position(|(candidate, _)| *candidate == op) else {
            return Ok(());
        };
        let (_, fault) = faults.remove(index);
        tracing::debug!(%op, ?fault, "injected edge fault");
        Err(match fault {
            Fault::Provisioning => DistributionError::Provisioning(format!("{op} refused")),
            Fault::Unavailable => DistributionError::Provider(format!("{op} unavailable")),
        })
    }

    /// Number of distributions currently defined.
    pub fn distribution_count(&self) -> usize {
        self.state.lock().distributions.len()
    }

    /// Number of policies currently defined.
    pub fn policy_count(&self) -> usize {
        self.state.lock().policies.len()
    }

    pub fn load(path: &Path) -> Result<Self, DistributionError> {
        let snapshot_error = |reason: String| DistributionError::Snapshot {
            path: path.to_path_buf(),
            reason,
        };
        let state = match std::fs::read(path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| snapshot_error(e.to_string()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => EdgeState::default(),
            Err(e) => return Err(snapshot_error(e.to_string())),
        };
        Ok(Self {
            state: Mutex::new(state),
            faults: Mutex::default(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), DistributionError> {
        let snapshot_error = |reason: String| DistributionError::Snapshot {
            path: path.to_path_buf(),
            reason,
        };
        let json = serde_json::to_vec_pretty(&*self.state.lock())
            .map_err(|e| snapshot_error(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| snapshot_error(e.to_string()))?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| snapshot_error(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| snapshot_error(e.to_string()))
    }
}

#[async_trait]
impl EdgeOps for MemoryEdge {
    async fn get_distribution(
        &self,
        id: &DistributionId,
    ) -> Result<DistributionRecord, DistributionError> {
        self.state.lock().distribution(id).cloned()
    }

    async fn list_distributions(&self) -> Result<Vec<DistributionRecord>, DistributionError> {
        Ok(self.state.lock().distributions.values().cloned().collect())
    }

    async fn copy_distribution(
        &self,
        source: &DistributionId,
        if_match: &ConfigRevision,
    ) -> Result<DistributionRecord, DistributionError> {
        self.take_fault(EdgeOp::CopyDistribution)?;
        let mut state = self.state.lock();
        let primary = state.check_distribution(source, if_match)?;
        if primary.config.staging {
            return Err(DistributionError::Provider(format!(
                "cannot copy staging distribution {source}"
            )));
        }
        let config = DistributionConfig {
            staging: true,
            continuous_deployment_policy: None,
            source_distribution: Some(source.clone()),
            comment: format!("staging copy of {source}"),
            ..primary.config.clone()
        };
        let id = DistributionId::new(state.next_id("ESTAGE"));
        let record = DistributionRecord {
            id: id.clone(),
            config_revision: state.next_revision(),
            config,
        };
        state.distributions.insert(id, record.clone());
        Ok(record)
    }

    async fn update_distribution(
        &self,
        id: &DistributionId,
        config: DistributionConfig,
        if_match: &ConfigRevision,
    ) -> Result<DistributionRecord, DistributionError> {
        self.take_fault(EdgeOp::UpdateDistribution)?;
        let mut state = self.state.lock();
        let current = state.check_distribution(id, if_match)?;
        if current.config.staging != config.staging {
            return Err(DistributionError::Provider(format!(
                "cannot change the staging flag of distribution {id}"
            )));
        }
        state.validate_attachment(&config)?;
        let record = DistributionRecord {
            id: id.clone(),
            config_revision: state.next_revision(),
            config,
        };
        state.distributions.insert(id.clone(), record.clone());
        Ok(record)
    }

    async fn update_with_staging_config(
        &self,
        production: &DistributionId,
        production_if_match: &ConfigRevision,
        staging: &DistributionId,
        staging_if_match: &ConfigRevision,
    ) -> Result<DistributionRecord, DistributionError> {
        self.take_fault(EdgeOp::UpdateWithStagingConfig)?;
        let mut state = self.state.lock();
        let origin_path = state
            .check_distribution(staging, staging_if_match)?
            .config
            .origin_path
            .clone();
        let current = state.check_distribution(production, production_if_match)?;
        if current.config.staging {
            return Err(DistributionError::Provider(format!(
                "{production} is a staging distribution"
            )));
        }
        let config = DistributionConfig {
            origin_path,
            ..current.config.clone()
        };
        let record = DistributionRecord {
            id: production.clone(),
            config_revision: state.next_revision(),
            config,
        };
        state.distributions.insert(production.clone(), record.clone());
        Ok(record)
    }

    async fn delete_distribution(
        &self,
        id: &DistributionId,
        if_match: &ConfigRevision,
    ) -> Result<(), DistributionError> {
        self.take_fault(EdgeOp::DeleteDistribution)?;
        let mut state = self.state.lock();
        let record = state.check_distribution(id, if_match)?;
        if let Some(policy) = &record.config.continuous_deployment_policy {
            return Err(DistributionError::Dependency {
                resource: format!("distribution {id}"),
                reason: format!("policy {policy} is attached"),
            });
        }
        if let Some(policy) = state
            .policies
            .values()
            .find(|p| &p.config.staging_distribution == id)
        {
            return Err(DistributionError::Dependency {
                resource: format!("distribution {id}"),
                reason: format!("policy {} routes to it", policy.id),
            });
        }
        state.distributions.remove(id);
        Ok(())
    }

    async fn create_policy(
        &self,
        config: PolicyConfig,
    ) -> Result<ContinuousDeploymentPolicy, DistributionError> {
        self.take_fault(EdgeOp::CreatePolicy)?;
        let mut state = self.state.lock();
        state.validate_policy(&config)?;
        let id = PolicyId::new(state.next_id("CDP"));
        let policy = ContinuousDeploymentPolicy {
            id: id.clone(),
            revision: state.next_revision(),
            config,
        };
        state.policies.insert(id, policy.clone());
        Ok(policy)
    }

    async fn get_policy(
        &self,
        id: &PolicyId,
    ) -> Result<ContinuousDeploymentPolicy, DistributionError> {
        self.state.lock().policy(id).cloned()
    }

    async fn list_policies(&self) -> Result<Vec<ContinuousDeploymentPolicy>, DistributionError> {
        Ok(self.state.lock().policies.values().cloned().collect())
    }

    async fn update_policy(
        &self,
        id: &PolicyId,
        config: PolicyConfig,
        if_match: &ConfigRevision,
    ) -> Result<ContinuousDeploymentPolicy, DistributionError> {
        self.take_fault(EdgeOp::UpdatePolicy)?;
        let mut state = self.state.lock();
        state.check_policy(id, if_match)?;
        state.validate_policy(&config)?;
        let policy = ContinuousDeploymentPolicy {
            id: id.clone(),
            revision: state.next_revision(),
            config,
        };
        state.policies.insert(id.clone(), policy.clone());
        Ok(policy)
    }

    async fn delete_policy(
        &self,
        id: &PolicyId,
        if_match: &ConfigRevision,
    ) -> Result<(), DistributionError> {
        self.take_fault(EdgeOp::DeletePolicy)?;
        let mut state = self.state.lock();
        state.check_policy(id, if_match)?;
        if let Some(holder) = state
            .distributions
            .values()
            .find(|d| d.config.continuous_deployment_policy.as_ref() == Some(id))
        {
            return Err(DistributionError::Dependency {
                resource: format!("policy {id}"),
                reason: format!("attached to distribution {}", holder.id),
            });
        }
        state.policies.remove(id);
        Ok(())
    }
}
