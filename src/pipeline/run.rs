// ABOUTME: Pipeline run records: stages, outcomes, phases, and status.
// ABOUTME: Serializable so runs can be archived and inspected after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{StageError, StageErrorKind};
use crate::events::SourceChange;
use crate::types::{DistributionId, PolicyId, RunId, ServiceName, Version};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Source,
    Build,
    Deploy,
    Approve,
    Promote,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Source => "source",
            Stage::Build => "build",
            Stage::Deploy => "deploy",
            Stage::Approve => "approve",
            Stage::Promote => "promote",
            Stage::Cleanup => "cleanup",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Purged,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Purged => "purged",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    Skipped,
    Failed,
    /// A reviewer rejected staging, or the approval expired.
    ApprovalRejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub outcome: StageOutcome,
    /// What the stage produced: a version prefix, a distribution, a revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Where a run is, with what that stage is working on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    Source {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        commit: Option<String>,
    },
    Build {
        previous: Version,
    },
    Deploy {
        version: Version,
        attempt: u32,
    },
    Approve {
        version: Version,
        staging: DistributionId,
        link: String,
    },
    Promote {
        version: Version,
        staging: DistributionId,
    },
    Cleanup {
        version: Version,
        staging: DistributionId,
    },
    Done {
        version: Version,
        cleaned_up: bool,
    },
    RolledBack {
        version: Version,
        staging: DistributionId,
        expired: bool,
    },
    Purged {
        staging: DistributionId,
    },
    Failed {
        stage: Stage,
        kind: StageErrorKind,
        error: String,
    },
}

/// One execution of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub service: ServiceName,
    pub source: SourceChange,
    pub stages: Vec<StageResult>,
    pub phase: RunPhase,
    pub current_stage: Option<Stage>,
    pub status: RunStatus,
    /// Failed, but redelivering the purge may still converge.
    #[serde(default)]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production: Option<DistributionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging: Option<DistributionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyId>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(id: RunId, service: ServiceName, source: SourceChange) -> Self {
        let commit = source.commit.clone();
        Self {
            id,
            service,
            source,
            stages: Vec::new(),
            phase: RunPhase::Source { commit },
            current_stage: Some(Stage::Source),
            status: RunStatus::Running,
            retryable: false,
            version: None,
            production: None,
            staging: None,
            policy: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn enter(&mut self, stage: Stage, phase: RunPhase) {
        self.current_stage = Some(stage);
        self.phase = phase;
    }

    pub fn record(
        &mut self,
        stage: Stage,
        outcome: StageOutcome,
        artifact: Option<String>,
        message: Option<String>,
    ) {
        self.stages.push(StageResult {
            stage,
            outcome,
            artifact,
            message,
            finished_at: Utc::now(),
        });
    }

    pub fn outcome_of(&self, stage: Stage) -> Option<StageOutcome> {
        self.stages
            .iter()
            .rev()
            .find(|r| r.stage == stage)
            .map(|r| r.outcome)
    }

    fn finish(&mut self, status: RunStatus, phase: RunPhase) {
        self.status = status;
        self.phase = phase;
        self.current_stage = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn succeed(&mut self, version: Version, cleaned_up: bool) {
        self.finish(
            RunStatus::Succeeded,
            RunPhase::Done {
                version,
                cleaned_up,
            },
        );
    }

    /// End the run because `stage` failed.
    pub fn fail(&mut self, stage: Stage, error: &StageError) {
        self.record(stage, StageOutcome::Failed, None, Some(error.to_string()));
        self.retryable = false;
        self.finish(
            RunStatus::Failed,
            RunPhase::Failed {
                stage,
                kind: error.kind(),
                error: error.to_string(),
            },
        );
    }

    /// Approval was rejected; the run waits for the purge.
    pub fn roll_back(&mut self, version: Version, staging: DistributionId, expired: bool) {
        let message = expired.then(|| "approval expired".to_string());
        self.record(
            Stage::Approve,
            StageOutcome::ApprovalRejected,
            Some(staging.to_string()),
            message,
        );
        self.current_stage = None;
        self.phase = RunPhase::RolledBack {
            version,
            staging,
            expired,
        };
    }

    pub fn mark_purged(&mut self, staging: DistributionId) {
        self.retryable = false;
        self.finish(RunStatus::Purged, RunPhase::Purged { staging });
    }

    pub fn mark_purge_failed(&mut self, error: String) {
        self.retryable = true;
        self.finish(
            RunStatus::Failed,
            RunPhase::Failed {
                stage: Stage::Cleanup,
                kind: StageErrorKind::Purge,
                error,
            },
        );
    }

    /// Waiting for a purge after a rejection, or failed one that may be redelivered.
    pub fn awaits_purge(&self) -> bool {
        matches!(self.phase, RunPhase::RolledBack { .. })
            || (self.status == RunStatus::Failed && self.retryable)
    }
}
