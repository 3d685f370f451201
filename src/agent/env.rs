// ABOUTME: Environment map handed to pipeline steps.
// ABOUTME: Names the variables every step can rely on.

use std::collections::BTreeMap;

/// Variable names exported to steps.
pub mod vars {
    /// Names starting with this are set by edgeswap and cannot come from config.
    pub const PREFIX: &str = "EDGESWAP_";

    pub const SERVICE: &str = "EDGESWAP_SERVICE";
    pub const RUN_ID: &str = "EDGESWAP_RUN_ID";
    pub const STAGE: &str = "EDGESWAP_STAGE";
    pub const REPOSITORY: &str = "EDGESWAP_REPOSITORY";
    pub const BRANCH: &str = "EDGESWAP_BRANCH";
    pub const COMMIT: &str = "EDGESWAP_COMMIT";
    pub const VERSION: &str = "EDGESWAP_VERSION";
    pub const PREVIOUS_VERSION: &str = "EDGESWAP_PREVIOUS_VERSION";
    pub const PRODUCTION_DISTRIBUTION_ID: &str = "EDGESWAP_PRODUCTION_DISTRIBUTION_ID";
    pub const STAGING_DISTRIBUTION_ID: &str = "EDGESWAP_STAGING_DISTRIBUTION_ID";
    pub const STAGING_CLEANUP_ENABLED: &str = "EDGESWAP_STAGING_CLEANUP_ENABLED";
    pub const SINGLE_HEADER: &str = "EDGESWAP_SINGLE_HEADER";
    pub const OUTPUT_DIR: &str = "EDGESWAP_OUTPUT_DIR";
    pub const REPORT: &str = "EDGESWAP_REPORT";
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageEnv {
    vars: BTreeMap<String, String>,
}

impl StageEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Set `key` only when a value is present.
    pub fn set_opt(&mut self, key: impl Into<String>, value: Option<impl Into<String>>) -> &mut Self {
        if let Some(value) = value {
            self.vars.insert(key.into(), value.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for StageEnv {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.vars.insert(k.into(), v.into());
        }
    }
}
