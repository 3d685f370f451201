// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles service names and approval recipient lists.

use nonempty::NonEmpty;
use serde::Deserialize;

use crate::types::ServiceName;

pub fn deserialize_service_name<'de, D>(deserializer: D) -> Result<ServiceName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ServiceName::new(&s).map_err(serde::de::Error::custom)
}

/// Accepts a single address or a list; blank entries are rejected.
pub fn deserialize_recipients<'de, D>(deserializer: D) -> Result<NonEmpty<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entry = RecipientEntry::deserialize(deserializer)?;
    let values = match entry {
        RecipientEntry::Single(s) => vec![s],
        RecipientEntry::List(list) => list,
    };

    let recipients = values
        .into_iter()
        .map(|r| {
            let trimmed = r.trim();
            if trimmed.is_empty() {
                Err(serde::de::Error::custom("recipient cannot be blank"))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect::<Result<Vec<_>, D::Error>>()?;

    NonEmpty::from_vec(recipients)
        .ok_or_else(|| serde::de::Error::custom("at least one recipient is required"))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecipientEntry {
    Single(String),
    List(Vec<String>),
}
