// ABOUTME: Versioned key/value config store holding cross-stage deployment facts.
// ABOUTME: Exposes the injectable store trait, its implementations, and typed parameters.

mod file;
mod memory;
mod params;

pub use file::FileConfigStore;
pub use memory::MemoryConfigStore;
pub use params::{DeploymentParams, Param, ParamStore, STAGING_NONE};

use async_trait::async_trait;

/// Key/value store for deployment parameters.
///
/// Reads must be strongly consistent: a `get` issued after a `put` returns
/// that value or a newer one. Multi-key updates are not transactional.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the current value of a key.
    async fn get(&self, key: &str) -> Result<String, StoreError>;

    /// Write a new value, returning the key's new revision number.
    async fn put(&self, key: &str, value: &str) -> Result<u64, StoreError>;
}

/// Errors from config store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("parameter not found: {0}")]
    NotFound(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("config store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn invalid(key: &str, reason: impl std::fmt::Display) -> Self {
        StoreError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
