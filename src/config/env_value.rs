// ABOUTME: Extra step variables declared under `env:` in the config file.
// ABOUTME: Values are literals or read from the process environment when a run starts.

use crate::agent::vars;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => std::env::var(var)
                .ok()
                .or_else(|| default.clone())
                .ok_or_else(|| Error::MissingEnvVar(var.clone())),
        }
    }
}

/// Reject names that would shadow the variables every step is given.
pub(crate) fn check_stage_var_names(map: &HashMap<String, EnvValue>) -> Result<()> {
    let mut reserved: Vec<&str> = map
        .keys()
        .map(String::as_str)
        .filter(|name| name.starts_with(vars::PREFIX))
        .collect();
    if reserved.is_empty() {
        return Ok(());
    }
    reserved.sort_unstable();
    Err(Error::InvalidConfig(format!(
        "env entries may not use the {} prefix: {}",
        vars::PREFIX,
        reserved.join(", ")
    )))
}

/// Resolve every step variable, ordered so step environments are stable.
pub fn resolve_stage_env(map: &HashMap<String, EnvValue>) -> Result<BTreeMap<String, String>> {
    check_stage_var_names(map)?;
    map.iter()
        .map(|(name, value)| value.resolve().map(|resolved| (name.clone(), resolved)))
        .collect()
}
