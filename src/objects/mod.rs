// ABOUTME: Object store holding published build artifacts under version prefixes.
// ABOUTME: Provides the injectable trait, memory and directory backends, and publishing.

mod fs;
mod memory;
mod publish;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use publish::{PublishReport, publish_artifact};

use async_trait::async_trait;
use bytes::Bytes;

/// Blob store keyed by absolute paths such as `/v2/index.html`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, body: Bytes) -> Result<(), ObjectStoreError>;

    async fn get(&self, path: &str) -> Result<Bytes, ObjectStoreError>;

    /// Whether any object lives under `prefix`.
    async fn exists(&self, prefix: &str) -> Result<bool, ObjectStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object path '{0}'")]
    InvalidPath(String),

    #[error("object store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ObjectStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ObjectStoreError::NotFound(_))
    }
}

/// Split a store path into its segments, rejecting traversal.
pub(crate) fn segments(path: &str) -> Result<Vec<&str>, ObjectStoreError> {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if parts.iter().any(|s| *s == "." || *s == "..") {
        return Err(ObjectStoreError::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

/// Canonical form of a store path: leading slash, no empty segments.
pub(crate) fn normalize(path: &str) -> Result<String, ObjectStoreError> {
    let parts = segments(path)?;
    if parts.is_empty() {
        return Err(ObjectStoreError::InvalidPath(path.to_string()));
    }
    Ok(format!("/{}", parts.join("/")))
}
