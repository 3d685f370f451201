// ABOUTME: Artifact version identifier for one frontend build.
// ABOUTME: Validated so it is always a single object-store path segment.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const MAX_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("version cannot be empty")]
    Empty,

    #[error("version exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("invalid character in version: '{0}'")]
    InvalidChar(char),

    #[error("'{0}' is not a usable version")]
    Reserved(String),
}

/// Opaque identifier of one build artifact.
///
/// The artifact lives under `/{version}/` in the object store and a
/// distribution serving it has origin path `/{version}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    pub fn new(value: &str) -> Result<Self, VersionError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(VersionError::Empty);
        }
        if value.len() > MAX_LEN {
            return Err(VersionError::TooLong);
        }
        if value == "." || value == ".." {
            return Err(VersionError::Reserved(value.to_string()));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_' | '+'))
        {
            return Err(VersionError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    /// Recover the version a distribution serves from its origin path.
    pub fn from_origin_path(path: &str) -> Result<Self, VersionError> {
        Self::new(path.trim_matches('/'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Origin path a distribution uses to serve this version.
    pub fn origin_path(&self) -> String {
        format!("/{}", self.0)
    }

    /// Object-store prefix holding this version's files.
    pub fn object_prefix(&self) -> String {
        format!("/{}/", self.0)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
