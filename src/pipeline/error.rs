// ABOUTME: Stage error types with SNAFU pattern.
// ABOUTME: Classifies stage failures for retry and reporting decisions.

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use super::run::Stage;
use crate::agent::{AgentError, Step};
use crate::approval::NotifyError;
use crate::distribution::DistributionError;
use crate::objects::ObjectStoreError;
use crate::store::StoreError;
use crate::types::VersionError;

/// Why a stage failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StageError {
    #[snafu(display("{step} step exited with code {code}"))]
    StepFailed { step: Step, code: i32, stderr: String },

    #[snafu(display("{step} step could not run: {source}"))]
    Agent { step: Step, source: AgentError },

    #[snafu(display("build reported no version and the source change has no commit"))]
    MissingVersion,

    #[snafu(display("build reported an unusable version: {source}"))]
    InvalidVersion { source: VersionError },

    #[snafu(display("build produced no artifact files"))]
    MissingArtifact,

    #[snafu(display("failed to publish artifact: {source}"))]
    Publish { source: ObjectStoreError },

    #[snafu(display("config store error during {stage}: {source}"))]
    Params { stage: Stage, source: StoreError },

    #[snafu(display("edge operation failed during {stage}: {source}"))]
    Edge {
        stage: Stage,
        source: DistributionError,
    },

    #[snafu(display("approval channel error: {source}"))]
    Approval { source: NotifyError },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// Nonzero exit, timeout, or missing output from a step.
    AgentFailure,
    /// Staging could not be provisioned. Deploy retries these.
    Provisioning,
    /// Production moved under Promote.
    Conflict,
    /// Deletion ordering violated.
    Dependency,
    /// Config or object store failure.
    Storage,
    Approval,
    Provider,
    /// Staging teardown after a rejection failed.
    Purge,
}

impl StageError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> StageErrorKind {
        match self {
            StageError::StepFailed { .. }
            | StageError::Agent { .. }
            | StageError::MissingVersion
            | StageError::InvalidVersion { .. }
            | StageError::MissingArtifact => StageErrorKind::AgentFailure,
            StageError::Publish { .. } | StageError::Params { .. } => StageErrorKind::Storage,
            StageError::Edge { source, .. } => match source {
                DistributionError::Provisioning(_) => StageErrorKind::Provisioning,
                DistributionError::Conflict { .. } => StageErrorKind::Conflict,
                DistributionError::Dependency { .. } => StageErrorKind::Dependency,
                DistributionError::Objects(_) => StageErrorKind::Storage,
                DistributionError::NotFound(_)
                | DistributionError::Provider(_)
                | DistributionError::Snapshot { .. } => StageErrorKind::Provider,
            },
            StageError::Approval { .. } => StageErrorKind::Approval,
        }
    }

    /// Whether Deploy should try again.
    pub fn is_retryable(&self) -> bool {
        self.kind() == StageErrorKind::Provisioning
    }
}
