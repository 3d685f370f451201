// ABOUTME: Staging/production swap protocol on top of the edge provider.
// ABOUTME: createStaging, repointStaging, bindPolicy, promote, and deleteStaging.

use std::sync::Arc;

use super::edge::{ContinuousDeploymentPolicy, DistributionRecord, EdgeOps, PolicyConfig};
use super::{DistributionError, ignore_missing};
use crate::objects::ObjectStore;
use crate::types::{ConfigRevision, DistributionId, HeaderPredicate, PolicyId, Version};

/// Result of binding a policy.
#[derive(Debug, Clone)]
pub struct PolicyBinding {
    pub policy: ContinuousDeploymentPolicy,
    /// Production revision after any attachment the binding performed.
    pub production_revision: ConfigRevision,
}

/// What a staging teardown removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingTeardown {
    pub detached: bool,
    pub policies_deleted: Vec<PolicyId>,
    pub distribution_deleted: bool,
}

#[derive(Clone)]
pub struct DistributionManager {
    edge: Arc<dyn EdgeOps>,
    objects: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for DistributionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributionManager").finish_non_exhaustive()
    }
}

impl DistributionManager {
    pub fn new(edge: Arc<dyn EdgeOps>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { edge, objects }
    }

    pub fn edge(&self) -> &Arc<dyn EdgeOps> {
        &self.edge
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    async fn ensure_published(&self, version: &Version) -> Result<(), DistributionError> {
        if self.objects.exists(&version.object_prefix()).await? {
            Ok(())
        } else {
            Err(DistributionError::Provisioning(format!(
                "nothing published under {}",
                version.object_prefix()
            )))
        }
    }

    /// Copy production into a new staging distribution serving `version`.
    pub async fn create_staging(
        &self,
        production: &DistributionId,
        version: &Version,
    ) -> Result<DistributionRecord, DistributionError> {
        self.ensure_published(version).await?;

        let primary = self.edge.get_distribution(production).await?;
        let copy = self
            .edge
            .copy_distribution(production, &primary.config_revision)
            .await?;

        let mut config = copy.config.clone();
        config.origin_path = version.origin_path();
        let staging = self
            .edge
            .update_distribution(&copy.id, config, &copy.config_revision)
            .await?;

        tracing::info!(
            distribution = %staging.id,
            version = %version,
            "staging distribution created"
        );
        Ok(staging)
    }

    /// Point a surviving staging distribution at `version`.
    pub async fn repoint_staging(
        &self,
        staging: &DistributionId,
        version: &Version,
    ) -> Result<DistributionRecord, DistributionError> {
        self.ensure_published(version).await?;

        let current = self.edge.get_distribution(staging).await?;
        if !current.config.staging {
            return Err(DistributionError::Provider(format!(
                "{staging} is not a staging distribution"
            )));
        }
        if current.config.origin_path == version.origin_path() {
            return Ok(current);
        }

        let mut config = current.config.clone();
        config.origin_path = version.origin_path();
        let record = self
            .edge
            .update_distribution(staging, config, &current.config_revision)
            .await?;

        tracing::info!(distribution = %staging, version = %version, "staging distribution re-pointed");
        Ok(record)
    }

    /// Route `predicate` traffic on `production` to `staging`.
    ///
    /// Binding the same staging target and predicate again changes nothing.
    pub async fn bind_policy(
        &self,
        production: &DistributionId,
        staging: &DistributionId,
        predicate: &HeaderPredicate,
    ) -> Result<PolicyBinding, DistributionError> {
        let primary = self.edge.get_distribution(production).await?;
        let desired = PolicyConfig {
            staging_distribution: staging.clone(),
            enabled: true,
            predicate: predicate.clone(),
        };

        let attached = match &primary.config.continuous_deployment_policy {
            Some(id) => match self.edge.get_policy(id).await {
                Ok(policy) => Some(policy),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        if let Some(existing) = attached {
            if existing.config == desired {
                return Ok(PolicyBinding {
                    policy: existing,
                    production_revision: primary.config_revision,
                });
            }
            let policy = self
                .edge
                .update_policy(&existing.id, desired, &existing.revision)
                .await?;
            tracing::info!(policy = %policy.id, distribution = %staging, "policy updated");
            return Ok(PolicyBinding {
                policy,
                production_revision: primary.config_revision,
            });
        }

        let policy = self.edge.create_policy(desired).await?;
        let mut config = primary.config.clone();
        config.continuous_deployment_policy = Some(policy.id.clone());
        let updated = self
            .edge
            .update_distribution(production, config, &primary.config_revision)
            .await?;

        tracing::info!(
            policy = %policy.id,
            distribution = %staging,
            predicate = %predicate,
            "policy attached to production"
        );
        Ok(PolicyBinding {
            policy,
            production_revision: updated.config_revision,
        })
    }

    /// Swap production onto the staging configuration behind `policy`.
    ///
    /// Fails with a conflict if production moved past `expected`. On success the
    /// policy is disabled and the new production revision is returned.
    pub async fn promote(
        &self,
        production: &DistributionId,
        policy: &PolicyId,
        expected: &ConfigRevision,
    ) -> Result<ConfigRevision, DistributionError> {
        let primary = self.edge.get_distribution(production).await?;
        if &primary.config_revision != expected {
            return Err(DistributionError::Conflict {
                resource: format!("distribution {production}"),
                expected: expected.clone(),
                found: primary.config_revision,
            });
        }

        let bound = self.edge.get_policy(policy).await?;
        let staging = self
            .edge
            .get_distribution(&bound.config.staging_distribution)
            .await?;

        let promoted = self
            .edge
            .update_with_staging_config(production, expected, &staging.id, &staging.config_revision)
            .await?;

        let mut config = bound.config.clone();
        config.enabled = false;
        self.edge
            .update_policy(policy, config, &bound.revision)
            .await?;

        tracing::info!(
            distribution = %production,
            origin = %promoted.config.origin_path,
            revision = %promoted.config_revision,
            "staging configuration promoted"
        );
        Ok(promoted.config_revision)
    }

    /// Detach and delete every policy routing to `staging`, then delete it.
    ///
    /// Missing resources count as already removed, so this is safe to repeat.
    pub async fn delete_staging(
        &self,
        production: &DistributionId,
        staging: &DistributionId,
        policy: Option<&PolicyId>,
    ) -> Result<StagingTeardown, DistributionError> {
        let mut teardown = StagingTeardown::default();

        let mut policies: Vec<PolicyId> = self
            .edge
            .list_policies()
            .await?
            .into_iter()
            .filter(|p| &p.config.staging_distribution == staging)
            .map(|p| p.id)
            .collect();
        // The hint may have been re-bound to a newer staging since; leave it then.
        if let Some(hint) = policy
            && !policies.contains(hint)
        {
            match self.edge.get_policy(hint).await {
                Ok(current) if &current.config.staging_distribution == staging => {
                    policies.push(hint.clone());
                }
                Ok(_) => {
                    tracing::debug!(policy = %hint, "policy routes elsewhere now, keeping it");
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let primary = self.edge.get_distribution(production).await?;
        if let Some(attached) = &primary.config.continuous_deployment_policy
            && policies.contains(attached)
        {
            let mut config = primary.config.clone();
            config.continuous_deployment_policy = None;
            self.edge
                .update_distribution(production, config, &primary.config_revision)
                .await?;
            teardown.detached = true;
        }

        for id in &policies {
            match self.edge.get_policy(id).await {
                Ok(current) => {
                    ignore_missing(self.edge.delete_policy(id, &current.revision).await)?;
                    teardown.policies_deleted.push(id.clone());
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        match self.edge.get_distribution(staging).await {
            Ok(current) => {
                ignore_missing(
                    self.edge
                        .delete_distribution(staging, &current.config_revision)
                        .await,
                )?;
                teardown.distribution_deleted = true;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        tracing::info!(
            distribution = %staging,
            policies = teardown.policies_deleted.len(),
            deleted = teardown.distribution_deleted,
            "staging torn down"
        );
        Ok(teardown)
    }
}
