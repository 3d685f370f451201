// ABOUTME: Pipeline orchestration using the type state pattern.
// ABOUTME: Exports rollout states, run records, the registry, the lock, and the orchestrator.

mod context;
mod error;
mod lock;
mod orchestrator;
mod registry;
mod rollout;
mod run;
mod state;

pub use context::{PipelineContext, PipelineSettings};
pub use error::{StageError, StageErrorKind};
pub use lock::{LockError, LockInfo, RunLock};
pub use orchestrator::{IgnoreReason, Orchestrator, SourceFilter, SourceOutcome};
pub use registry::RunRegistry;
pub use rollout::{Decided, Rollout, TransitionResult};
pub use run::{PipelineRun, RunPhase, RunStatus, Stage, StageOutcome, StageResult};
pub use state::{
    Approved, AwaitingApproval, Built, Completed, Deployed, Promoted, Rejected, Sourced, Staged,
    Triggered,
};
