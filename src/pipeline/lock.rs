// ABOUTME: Run lock preventing concurrent rollouts of the same service across processes.
// ABOUTME: Uses atomic file creation with lock info stored in the state directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::ServiceName;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("rollout of {service} already in progress (held by {holder}, pid {pid}, since {started_at})")]
    Held {
        service: String,
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("lock acquired by another process during break")]
    Raced,

    #[error("lock file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize lock: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Information about who holds a run lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Service being rolled out.
    pub service: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(service: &ServiceName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            service: service.to_string(),
        }
    }

    /// Check if this lock is older than `stale_after`.
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        let age = Utc::now() - self.started_at;
        age.to_std().is_ok_and(|age| age >= stale_after)
    }

    /// Path to the lock file for a service.
    pub fn lock_path(state_dir: &Path, service: &ServiceName) -> PathBuf {
        state_dir.join(format!("{service}.lock"))
    }
}

/// A held run lock. Call [`RunLock::release`] when the rollout ends.
pub struct RunLock {
    path: PathBuf,
    service: ServiceName,
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock")
            .field("service", &self.service)
            .field("path", &self.path)
            .finish()
    }
}

impl RunLock {
    /// Acquire the run lock for `service`.
    ///
    /// Uses exclusive file creation, so two processes cannot both succeed.
    /// Stale locks are broken with a warning; `force` breaks any lock.
    pub fn acquire(
        state_dir: &Path,
        service: &ServiceName,
        stale_after: Duration,
        force: bool,
    ) -> Result<Self, LockError> {
        std::fs::create_dir_all(state_dir)?;
        let path = LockInfo::lock_path(state_dir, service);
        let info = LockInfo::new(service);
        let json = serde_json::to_string(&info)?;

        if try_create(&path, &json)? {
            return Ok(Self {
                path,
                service: service.clone(),
            });
        }

        if !Self::should_break(&path, stale_after, force) {
            if let Some(existing) = read_info(&path) {
                return Err(LockError::Held {
                    service: existing.service,
                    holder: existing.holder,
                    pid: existing.pid,
                    started_at: existing.started_at,
                });
            }
            return Err(LockError::Raced);
        }

        tracing::debug!(path = %path.display(), "removing stale/forced lock");
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if !try_create(&path, &json)? {
            return Err(LockError::Raced);
        }

        Ok(Self {
            path,
            service: service.clone(),
        })
    }

    /// Check if an existing lock should be broken (stale, forced, or corrupted).
    fn should_break(path: &Path, stale_after: Duration, force: bool) -> bool {
        let Some(existing) = read_info(path) else {
            tracing::warn!("lock info unreadable, breaking lock");
            return true;
        };

        if force {
            tracing::warn!(
                holder = %existing.holder,
                pid = existing.pid,
                since = %existing.started_at,
                "breaking lock"
            );
            true
        } else if existing.is_stale(stale_after) {
            tracing::warn!(
                holder = %existing.holder,
                pid = existing.pid,
                since = %existing.started_at,
                "auto-breaking stale lock"
            );
            true
        } else {
            false
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock.
    pub fn release(self) -> Result<(), LockError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn try_create(path: &Path, contents: &str) -> Result<bool, LockError> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(contents.as_bytes())?;
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}
