// ABOUTME: Edge provider operations trait and the records it exchanges.
// ABOUTME: Mirrors the provider API: distributions, copies, and deployment policies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::DistributionError;
use crate::types::{ConfigRevision, DistributionId, HeaderPredicate, PolicyId, Version};

/// Whether a distribution serves the public or only test traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Production,
    Staging,
}

/// Mutable configuration of one distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Object-store prefix requests are served from, e.g. `/v2`.
    pub origin_path: String,
    pub staging: bool,
    /// Policy attached to a production distribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuous_deployment_policy: Option<PolicyId>,
    /// Production distribution a staging copy was made from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_distribution: Option<DistributionId>,
    #[serde(default)]
    pub comment: String,
    pub enabled: bool,
}

/// A distribution as last read from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRecord {
    pub id: DistributionId,
    /// Must be presented unchanged to mutate this distribution.
    pub config_revision: ConfigRevision,
    pub config: DistributionConfig,
}

impl DistributionRecord {
    pub fn role(&self) -> Role {
        if self.config.staging {
            Role::Staging
        } else {
            Role::Production
        }
    }

    /// Version the distribution serves, derived from its origin path.
    pub fn served_version(&self) -> Option<Version> {
        Version::from_origin_path(&self.config.origin_path).ok()
    }
}

/// Configuration of a continuous-deployment policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub staging_distribution: DistributionId,
    pub enabled: bool,
    pub predicate: HeaderPredicate,
}

/// Binds a staging distribution to production behind a traffic predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuousDeploymentPolicy {
    pub id: PolicyId,
    pub revision: ConfigRevision,
    pub config: PolicyConfig,
}

/// Edge provider API.
///
/// Every mutation takes the revision the caller last read and fails with
/// [`DistributionError::Conflict`] when the resource has moved on since.
#[async_trait]
pub trait EdgeOps: Send + Sync {
    async fn get_distribution(
        &self,
        id: &DistributionId,
    ) -> Result<DistributionRecord, DistributionError>;

    async fn list_distributions(&self) -> Result<Vec<DistributionRecord>, DistributionError>;

    /// Create a staging copy of `source` with no policy attached.
    async fn copy_distribution(
        &self,
        source: &DistributionId,
        if_match: &ConfigRevision,
    ) -> Result<DistributionRecord, DistributionError>;

    async fn update_distribution(
        &self,
        id: &DistributionId,
        config: DistributionConfig,
        if_match: &ConfigRevision,
    ) -> Result<DistributionRecord, DistributionError>;

    /// Copy the staging distribution's content settings onto production.
    async fn update_with_staging_config(
        &self,
        production: &DistributionId,
        production_if_match: &ConfigRevision,
        staging: &DistributionId,
        staging_if_match: &ConfigRevision,
    ) -> Result<DistributionRecord, DistributionError>;

    /// Fails with [`DistributionError::Dependency`] while a policy references it.
    async fn delete_distribution(
        &self,
        id: &DistributionId,
        if_match: &ConfigRevision,
    ) -> Result<(), DistributionError>;

    async fn create_policy(
        &self,
        config: PolicyConfig,
    ) -> Result<ContinuousDeploymentPolicy, DistributionError>;

    async fn get_policy(&self, id: &PolicyId)
    -> Result<ContinuousDeploymentPolicy, DistributionError>;

    async fn list_policies(&self) -> Result<Vec<ContinuousDeploymentPolicy>, DistributionError>;

    async fn update_policy(
        &self,
        id: &PolicyId,
        config: PolicyConfig,
        if_match: &ConfigRevision,
    ) -> Result<ContinuousDeploymentPolicy, DistributionError>;

    /// Fails with [`DistributionError::Dependency`] while attached to a distribution.
    async fn delete_policy(
        &self,
        id: &PolicyId,
        if_match: &ConfigRevision,
    ) -> Result<(), DistributionError>;
}
