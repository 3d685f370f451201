// ABOUTME: Application-wide error types for edgeswap.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::approval::NotifyError;
use crate::distribution::DistributionError;
use crate::objects::ObjectStoreError;
use crate::pipeline::{LockError, RunStatus};
use crate::purge::PurgeError;
use crate::store::StoreError;
use crate::types::{RunId, VersionError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("service {0} is not bootstrapped; run `edgeswap bootstrap` first")]
    NotBootstrapped(String),

    #[error("service {0} is already bootstrapped (use --force to re-seed)")]
    AlreadyBootstrapped(String),

    #[error("unknown run: {0}")]
    UnknownRun(RunId),

    #[error("run {run_id} is {status} and has nothing to purge")]
    NothingToPurge { run_id: RunId, status: RunStatus },

    #[error("run {run_id} finished as {status}")]
    RunFailed { run_id: RunId, status: RunStatus },

    #[error("source change ignored: {0}")]
    Ignored(String),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Objects(#[from] ObjectStoreError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Purge(#[from] PurgeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
