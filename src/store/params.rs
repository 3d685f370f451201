// ABOUTME: Typed access to the deployment parameters of one service.
// ABOUTME: Maps each field to its namespaced key and a fixed string encoding.

use serde::Serialize;
use std::sync::Arc;

use super::{ConfigStore, StoreError};
use crate::types::{DistributionId, HeaderPredicate, ServiceName, Version};

/// Stored value meaning "no staging distribution exists".
pub const STAGING_NONE: &str = "none";

/// Placeholder the original provisioning seeded into the staging key.
const LEGACY_PLACEHOLDER: &str = "dummy";

/// The deployment parameters kept in the config store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    FrontendVersion,
    ProductionDistributionId,
    StagingDistributionId,
    StagingCleanupEnabled,
    SingleHeaderPredicate,
}

impl Param {
    pub const ALL: [Param; 5] = [
        Param::FrontendVersion,
        Param::ProductionDistributionId,
        Param::StagingDistributionId,
        Param::StagingCleanupEnabled,
        Param::SingleHeaderPredicate,
    ];

    fn suffix(self) -> &'static str {
        match self {
            Param::FrontendVersion => "version/frontend",
            Param::ProductionDistributionId => "distribution/production",
            Param::StagingDistributionId => "distribution/staging",
            Param::StagingCleanupEnabled => "distribution/cleanup-enabled",
            Param::SingleHeaderPredicate => "distribution/single-header",
        }
    }

    /// Field name used in status output.
    pub fn name(self) -> &'static str {
        match self {
            Param::FrontendVersion => "frontendVersion",
            Param::ProductionDistributionId => "productionDistributionId",
            Param::StagingDistributionId => "stagingDistributionId",
            Param::StagingCleanupEnabled => "stagingCleanupEnabled",
            Param::SingleHeaderPredicate => "singleHeaderPredicate",
        }
    }

    pub fn key(self, service: &ServiceName) -> String {
        service.key_path(self.suffix())
    }
}

/// Every parameter of one service, read together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentParams {
    pub frontend_version: Version,
    pub production_distribution_id: DistributionId,
    pub staging_distribution_id: Option<DistributionId>,
    pub staging_cleanup_enabled: bool,
    pub single_header_predicate: HeaderPredicate,
}

/// Typed view over a [`ConfigStore`] for one service.
#[derive(Clone)]
pub struct ParamStore {
    store: Arc<dyn ConfigStore>,
    service: ServiceName,
}

impl std::fmt::Debug for ParamStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamStore")
            .field("service", &self.service)
            .finish()
    }
}

impl ParamStore {
    pub fn new(store: Arc<dyn ConfigStore>, service: ServiceName) -> Self {
        Self { store, service }
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    async fn read(&self, param: Param) -> Result<(String, String), StoreError> {
        let key = param.key(&self.service);
        let value = self.store.get(&key).await?;
        Ok((key, value))
    }

    async fn write(&self, param: Param, value: &str) -> Result<(), StoreError> {
        let key = param.key(&self.service);
        let revision = self.store.put(&key, value).await?;
        tracing::debug!(
            service = %self.service,
            param = param.name(),
            value,
            revision,
            "parameter updated"
        );
        Ok(())
    }

    pub async fn frontend_version(&self) -> Result<Version, StoreError> {
        let (key, value) = self.read(Param::FrontendVersion).await?;
        Version::new(&value).map_err(|e| StoreError::invalid(&key, e))
    }

    pub async fn set_frontend_version(&self, version: &Version) -> Result<(), StoreError> {
        self.write(Param::FrontendVersion, version.as_str()).await
    }

    pub async fn production_distribution_id(&self) -> Result<DistributionId, StoreError> {
        let (key, value) = self.read(Param::ProductionDistributionId).await?;
        if value.trim().is_empty() {
            return Err(StoreError::invalid(&key, "empty distribution id"));
        }
        Ok(DistributionId::new(value))
    }

    pub async fn set_production_distribution_id(
        &self,
        id: &DistributionId,
    ) -> Result<(), StoreError> {
        self.write(Param::ProductionDistributionId, id.as_str()).await
    }

    /// The staging distribution, or `None` when the slot is empty.
    pub async fn staging_distribution_id(&self) -> Result<Option<DistributionId>, StoreError> {
        let (_, value) = self.read(Param::StagingDistributionId).await?;
        match value.as_str() {
            STAGING_NONE | LEGACY_PLACEHOLDER | "" => Ok(None),
            id => Ok(Some(DistributionId::new(id))),
        }
    }

    pub async fn set_staging_distribution_id(
        &self,
        id: Option<&DistributionId>,
    ) -> Result<(), StoreError> {
        let value = id.map_or(STAGING_NONE, |id| id.as_str());
        self.write(Param::StagingDistributionId, value).await
    }

    pub async fn staging_cleanup_enabled(&self) -> Result<bool, StoreError> {
        let (key, value) = self.read(Param::StagingCleanupEnabled).await?;
        match value.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(StoreError::invalid(
                &key,
                format!("expected true or false, got '{other}'"),
            )),
        }
    }

    pub async fn set_staging_cleanup_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.write(Param::StagingCleanupEnabled, if enabled { "true" } else { "false" })
            .await
    }

    pub async fn single_header_predicate(&self) -> Result<HeaderPredicate, StoreError> {
        let (key, value) = self.read(Param::SingleHeaderPredicate).await?;
        HeaderPredicate::from_json(&value).map_err(|e| StoreError::invalid(&key, e))
    }

    pub async fn set_single_header_predicate(
        &self,
        predicate: &HeaderPredicate,
    ) -> Result<(), StoreError> {
        self.write(Param::SingleHeaderPredicate, &predicate.to_json())
            .await
    }

    /// Read every parameter.
    pub async fn snapshot(&self) -> Result<DeploymentParams, StoreError> {
        Ok(DeploymentParams {
            frontend_version: self.frontend_version().await?,
            production_distribution_id: self.production_distribution_id().await?,
            staging_distribution_id: self.staging_distribution_id().await?,
            staging_cleanup_enabled: self.staging_cleanup_enabled().await?,
            single_header_predicate: self.single_header_predicate().await?,
        })
    }

    /// Write every parameter, one key at a time.
    pub async fn seed(&self, params: &DeploymentParams) -> Result<(), StoreError> {
        self.set_frontend_version(&params.frontend_version).await?;
        self.set_production_distribution_id(&params.production_distribution_id)
            .await?;
        self.set_staging_distribution_id(params.staging_distribution_id.as_ref())
            .await?;
        self.set_staging_cleanup_enabled(params.staging_cleanup_enabled)
            .await?;
        self.set_single_header_predicate(&params.single_header_predicate)
            .await
    }
}
