// ABOUTME: Single-header traffic predicate for continuous-deployment policies.
// ABOUTME: Requests carrying exactly the configured header value reach staging.

use hyper::HeaderMap;
use hyper::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Header name the edge provider reserves for staging test traffic.
pub const DEFAULT_STAGING_HEADER: &str = "aws-cf-cd-staging";

#[derive(Debug, Error)]
pub enum HeaderPredicateError {
    #[error("invalid header name '{0}'")]
    InvalidName(String),

    #[error("invalid header value '{0}'")]
    InvalidValue(String),

    #[error("header value cannot be empty")]
    EmptyValue,

    #[error("malformed predicate encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Routes a request to staging when `header` is present with exactly `value`.
///
/// Header names are case-insensitive as in HTTP; values compare byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPredicate {
    header: HeaderName,
    value: HeaderValue,
}

impl HeaderPredicate {
    pub fn new(header: &str, value: &str) -> Result<Self, HeaderPredicateError> {
        let header = HeaderName::from_bytes(header.trim().as_bytes())
            .map_err(|_| HeaderPredicateError::InvalidName(header.to_string()))?;
        if value.is_empty() {
            return Err(HeaderPredicateError::EmptyValue);
        }
        // Visible ASCII only: `to_str` must be able to read the value back.
        if !value.bytes().all(|b| b == b'\t' || (0x20..0x7f).contains(&b)) {
            return Err(HeaderPredicateError::InvalidValue(value.to_string()));
        }
        let value = HeaderValue::from_str(value)
            .map_err(|_| HeaderPredicateError::InvalidValue(value.to_string()))?;
        Ok(Self { header, value })
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    pub fn value(&self) -> &str {
        // `new` admits visible ASCII only, which `to_str` always accepts.
        self.value.to_str().unwrap_or_default()
    }

    /// Whether a request with these headers belongs to staging.
    pub fn matches(&self, headers: &HeaderMap) -> bool {
        headers
            .get(&self.header)
            .is_some_and(|candidate| *candidate == self.value)
    }

    /// Opaque single-string form handed to stages and stored in the config store.
    pub fn to_json(&self) -> String {
        // Serializing two strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(encoded: &str) -> Result<Self, HeaderPredicateError> {
        Ok(serde_json::from_str(encoded)?)
    }
}

impl Default for HeaderPredicate {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static(DEFAULT_STAGING_HEADER),
            value: HeaderValue::from_static("true"),
        }
    }
}

impl fmt::Display for HeaderPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.header, self.value())
    }
}

#[derive(Serialize, Deserialize)]
struct RawPredicate {
    header: String,
    value: RawValue,
}

/// Older configs wrote the value as a JSON boolean.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Flag(bool),
    Text(String),
}

impl Serialize for HeaderPredicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawPredicate {
            header: self.header.as_str().to_string(),
            value: RawValue::Text(self.value().to_string()),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HeaderPredicate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawPredicate::deserialize(deserializer)?;
        let value = match raw.value {
            RawValue::Flag(flag) => flag.to_string(),
            RawValue::Text(text) => text,
        };
        HeaderPredicate::new(&raw.header, &value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_staging_header() {
        let predicate = HeaderPredicate::default();
        assert_eq!(predicate.header().as_str(), "aws-cf-cd-staging");
        assert_eq!(predicate.value(), "true");
    }

    #[test]
    fn boolean_value_is_accepted() {
        let predicate =
            HeaderPredicate::from_json(r#"{"header":"aws-cf-cd-staging","value":true}"#).unwrap();
        assert_eq!(predicate, HeaderPredicate::default());
    }

    #[test]
    fn json_form_is_stable() {
        let predicate = HeaderPredicate::new("x-preview", "blue").unwrap();
        assert_eq!(predicate.to_json(), r#"{"header":"x-preview","value":"blue"}"#);
    }

    #[test]
    fn header_name_case_is_ignored() {
        let predicate = HeaderPredicate::new("X-Preview", "blue").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-preview", HeaderValue::from_static("blue"));
        assert!(predicate.matches(&headers));
    }

    #[test]
    fn non_ascii_value_is_rejected() {
        assert!(matches!(
            HeaderPredicate::new("x-preview", "café"),
            Err(HeaderPredicateError::InvalidValue(v)) if v == "café"
        ));
        assert!(HeaderPredicate::from_json(r#"{"header":"x-preview","value":"café"}"#).is_err());
    }

    #[test]
    fn accepted_values_survive_the_stored_form() {
        for raw in ["blue", "a b", "~!@#$%^&*()", "tab\there"] {
            let predicate = HeaderPredicate::new("x-preview", raw).unwrap();
            assert_eq!(predicate.value(), raw);
            assert_eq!(HeaderPredicate::from_json(&predicate.to_json()).unwrap(), predicate);
        }
    }

    #[test]
    fn empty_value_is_rejected() {
        assert!(matches!(
            HeaderPredicate::new("x-preview", ""),
            Err(HeaderPredicateError::EmptyValue)
        ));
    }
}
