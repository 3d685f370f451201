// ABOUTME: DNS-compatible service name validation.
// ABOUTME: Service names namespace every config store key and edge resource.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceNameError {
    #[error("service name cannot be empty")]
    Empty,

    #[error("service name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("service name must start and end with a letter or digit")]
    BadEdge,

    #[error("service name must be lowercase")]
    NotLowercase,

    #[error("invalid character in service name: '{0}'")]
    InvalidChar(char),
}

/// Name of the frontend service being rolled out (RFC 1123 label).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(value: &str) -> Result<Self, ServiceNameError> {
        if value.is_empty() {
            return Err(ServiceNameError::Empty);
        }

        if value.len() > 63 {
            return Err(ServiceNameError::TooLong);
        }

        if value.starts_with('-') || value.ends_with('-') {
            return Err(ServiceNameError::BadEdge);
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(ServiceNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
                return Err(ServiceNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key path under this service's namespace, e.g. `/shop/version/frontend`.
    pub fn key_path(&self, suffix: &str) -> String {
        format!("/{}/{}", self.0, suffix.trim_start_matches('/'))
    }
}

impl TryFrom<String> for ServiceName {
    type Error = ServiceNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ServiceName> for String {
    fn from(name: ServiceName) -> Self {
        name.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_path_is_namespaced() {
        let name = ServiceName::new("shop").unwrap();
        assert_eq!(name.key_path("version/frontend"), "/shop/version/frontend");
        assert_eq!(name.key_path("/distribution/staging"), "/shop/distribution/staging");
    }

    #[test]
    fn rejects_hyphen_edges() {
        assert_eq!(ServiceName::new("-shop"), Err(ServiceNameError::BadEdge));
        assert_eq!(ServiceName::new("shop-"), Err(ServiceNameError::BadEdge));
    }
}
