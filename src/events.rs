// ABOUTME: Inbound events that drive the pipeline.
// ABOUTME: Source changes start runs; approval decisions resume them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A push to a watched repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceChange {
    pub repository: String,
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl SourceChange {
    pub fn new(
        repository: impl Into<String>,
        branch: impl Into<String>,
        commit: Option<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
            commit,
        }
    }

    /// Identity used to drop redelivered events. Events without a commit have none.
    pub fn dedupe_key(&self) -> Option<(String, String, String)> {
        self.commit
            .as_ref()
            .map(|c| (self.repository.clone(), self.branch.clone(), c.clone()))
    }
}

impl fmt::Display for SourceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repository, self.branch)?;
        if let Some(commit) = &self.commit {
            write!(f, " ({commit})")?;
        }
        Ok(())
    }
}

/// A human approval decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Accept => "accept",
            Decision::Reject => "reject",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown decision '{0}', expected accept or reject")]
pub struct ParseDecisionError(String);

impl FromStr for Decision {
    type Err = ParseDecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accept" | "approve" | "approved" => Ok(Decision::Accept),
            "reject" | "rejected" => Ok(Decision::Reject),
            _ => Err(ParseDecisionError(s.to_string())),
        }
    }
}
