// ABOUTME: Staging/production distribution management on the edge layer.
// ABOUTME: Exports the provider trait, local simulator, swap protocol, and routing.

mod edge;
mod manager;
mod memory;
mod orphans;
mod routing;

pub use edge::{
    ContinuousDeploymentPolicy, DistributionConfig, DistributionRecord, EdgeOps, PolicyConfig,
    Role,
};
pub use manager::{DistributionManager, PolicyBinding, StagingTeardown};
pub use memory::{EdgeOp, Fault, MemoryEdge};
pub use orphans::{CleanupFailure, CleanupResult, cleanup_orphans, detect_orphans};
pub use routing::{SERVED_BY_HEADER, route, serve};

use std::path::PathBuf;

use crate::objects::ObjectStoreError;
use crate::types::ConfigRevision;

/// Errors from edge provider and distribution manager operations.
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    /// Nothing is published for the version, or the provider refused to provision.
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// The resource changed since the caller read it.
    #[error("revision conflict on {resource}: expected {expected}, found {found}")]
    Conflict {
        resource: String,
        expected: ConfigRevision,
        found: ConfigRevision,
    },

    /// Deletion ordering violated: something still references the resource.
    #[error("{resource} is still in use: {reason}")]
    Dependency { resource: String, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("edge provider error: {0}")]
    Provider(String),

    #[error("object store error: {0}")]
    Objects(#[from] ObjectStoreError),

    #[error("edge snapshot {path}: {reason}")]
    Snapshot { path: PathBuf, reason: String },
}

impl DistributionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DistributionError::NotFound(_))
    }

    pub fn is_provisioning(&self) -> bool {
        matches!(self, DistributionError::Provisioning(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DistributionError::Conflict { .. })
    }

    pub fn is_dependency(&self) -> bool {
        matches!(self, DistributionError::Dependency { .. })
    }
}

/// Treat a missing resource as already gone.
pub(crate) fn ignore_missing(result: Result<(), DistributionError>) -> Result<(), DistributionError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}
