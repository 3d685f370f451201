// ABOUTME: Rollout state marker types for the type state pattern.
// ABOUTME: Each state carries the data later stages are guaranteed to have.

use std::path::PathBuf;

use crate::approval::PendingApproval;
use crate::types::{ConfigRevision, DistributionId, HeaderPredicate, PolicyId, Version};

/// Source change accepted, nothing run yet.
/// Available actions: `source()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Triggered;

/// Checked out; production's version is known.
/// Available actions: `build()`
#[derive(Debug, Clone)]
pub struct Sourced {
    pub(crate) previous: Version,
}

/// Artifact built and versioned.
/// Available actions: `deploy()`
#[derive(Debug, Clone)]
pub struct Built {
    pub(crate) previous: Version,
    pub(crate) version: Version,
    pub(crate) artifact: PathBuf,
}

/// Facts fixed once staging is serving the new version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staged {
    pub previous: Version,
    pub version: Version,
    pub production: DistributionId,
    pub staging: DistributionId,
    pub policy: PolicyId,
    pub predicate: HeaderPredicate,
    /// Last production revision this run observed or wrote. Promote swaps against it.
    pub production_revision: ConfigRevision,
}

/// Staging serves the new version behind the policy.
/// Available actions: `request_approval()`
#[derive(Debug, Clone)]
pub struct Deployed {
    pub(crate) staged: Staged,
}

/// Prompt delivered; suspended on the reviewer.
/// Available actions: `await_decision()`
#[derive(Debug)]
pub struct AwaitingApproval {
    pub(crate) staged: Staged,
    pub(crate) link: String,
    pub(crate) pending: PendingApproval,
}

/// Reviewer accepted.
/// Available actions: `promote()`
#[derive(Debug, Clone)]
pub struct Approved {
    pub(crate) staged: Staged,
}

/// Reviewer rejected or the approval expired.
/// Available actions: `purge_request()`
#[derive(Debug, Clone)]
pub struct Rejected {
    pub(crate) staged: Staged,
    pub(crate) expired: bool,
}

/// Production serves the new version.
/// Available actions: `finish()`
#[derive(Debug, Clone)]
pub struct Promoted {
    pub(crate) staged: Staged,
}

/// Rollout finished.
#[derive(Debug, Clone)]
pub struct Completed {
    pub(crate) version: Version,
    pub(crate) cleaned_up: bool,
}
