// ABOUTME: Orphaned staging distribution detection and cleanup.
// ABOUTME: Finds staging copies left behind by interrupted rollouts.

use super::DistributionError;
use super::edge::{DistributionRecord, EdgeOps};
use super::manager::DistributionManager;
use crate::types::DistributionId;

/// Detect staging distributions copied from `production` that nothing tracks.
///
/// An orphan is a staging distribution that:
/// - was copied from `production`
/// - is not `known` (the staging id recorded in the config store)
pub async fn detect_orphans(
    edge: &dyn EdgeOps,
    production: &DistributionId,
    known: Option<&DistributionId>,
) -> Result<Vec<DistributionRecord>, DistributionError> {
    Ok(edge
        .list_distributions()
        .await?
        .into_iter()
        .filter(|d| d.config.staging)
        .filter(|d| d.config.source_distribution.as_ref() == Some(production))
        .filter(|d| known != Some(&d.id))
        .collect())
}

/// A staging distribution that could not be removed.
#[derive(Debug)]
pub struct CleanupFailure {
    pub id: DistributionId,
    pub error: DistributionError,
}

/// Outcome of an orphan cleanup.
#[derive(Debug, Default)]
pub struct CleanupResult {
    pub removed: Vec<DistributionId>,
    pub failed: Vec<CleanupFailure>,
}

impl CleanupResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Tear down each orphan, continuing past failures.
pub async fn cleanup_orphans(
    manager: &DistributionManager,
    production: &DistributionId,
    orphans: &[DistributionId],
) -> CleanupResult {
    let mut result = CleanupResult::default();

    for id in orphans {
        match manager.delete_staging(production, id, None).await {
            Ok(_) => result.removed.push(id.clone()),
            Err(error) => {
                tracing::warn!(distribution = %id, %error, "failed to remove orphan");
                result.failed.push(CleanupFailure {
                    id: id.clone(),
                    error,
                });
            }
        }
    }

    result
}
