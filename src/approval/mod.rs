// ABOUTME: Human-approval channel: prompt delivery and the decide entry point.
// ABOUTME: Exports the notifier trait, its implementations, and the gateway.

mod gateway;
mod notifier;

pub use gateway::{ApprovalGateway, ApprovalOutcome, DecideResult, PendingApproval};
pub use notifier::{MemoryNotifier, Notifier, TracingNotifier};

use nonempty::NonEmpty;
use serde::Serialize;

use crate::types::{RunId, ServiceName};

/// What a reviewer receives when a run reaches Approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalPrompt {
    pub run_id: RunId,
    pub service: ServiceName,
    /// Console link to the staging distribution.
    pub link: String,
    /// How to reach staging: the header and value to send.
    pub instructions: String,
    pub recipients: NonEmpty<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("no approval is pending for run {0}")]
    UnknownRun(RunId),

    #[error("approval for run {0} is already pending")]
    AlreadyPending(RunId),

    #[error("failed to deliver approval prompt: {0}")]
    Delivery(String),
}
