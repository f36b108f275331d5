//! Cache entry envelope and the host-facing input types

use crate::constants::MAX_TTL_SECONDS;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

/// Envelope stored under an entry key
///
/// Serialized as `{"value": .., "lastModified": <epoch millis>, "tags": [..]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub value: Value,
    pub last_modified: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CacheEntry {
    /// Envelope stamped with the current time
    pub fn new(value: Value, tags: Vec<String>) -> Self {
        Self {
            value,
            last_modified: Utc::now().timestamp_millis(),
            tags,
        }
    }
}

/// Payload the host hands to `set`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheData {
    #[serde(default)]
    pub value: Value,

    /// Requested lifetime in seconds; anything that is not a number is ignored
    #[serde(
        default,
        deserialize_with = "lenient_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub revalidate: Option<f64>,
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(raw.as_f64())
}

impl CacheData {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            revalidate: None,
        }
    }

    pub fn with_revalidate(mut self, seconds: f64) -> Self {
        self.revalidate = Some(seconds);
        self
    }

    /// `revalidate` rounded up to whole seconds when it is a positive finite
    /// number, otherwise `default`; clamped to [`MAX_TTL_SECONDS`] either way
    pub fn effective_ttl(&self, default: Duration) -> Duration {
        let max = Duration::from_secs(MAX_TTL_SECONDS);
        match self.revalidate {
            Some(seconds) if seconds.is_finite() && seconds > 0.0 => {
                Duration::from_secs(seconds.ceil().min(MAX_TTL_SECONDS as f64) as u64)
            }
            _ => default.min(max),
        }
    }
}

/// One tag or a list of tags, as the host may pass either
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagInput {
    One(String),
    Many(Vec<String>),
}

impl Default for TagInput {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl TagInput {
    /// Normalize to a list: a bare tag becomes a one-element list, duplicates
    /// are removed keeping the first occurrence
    pub fn into_tags(self) -> Vec<String> {
        match self {
            Self::One(tag) => vec![tag],
            Self::Many(tags) => {
                let mut seen = HashSet::with_capacity(tags.len());
                tags.into_iter()
                    .filter(|tag| seen.insert(tag.clone()))
                    .collect()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Many(tags) if tags.is_empty())
    }
}

impl From<&str> for TagInput {
    fn from(tag: &str) -> Self {
        Self::One(tag.to_string())
    }
}

impl From<String> for TagInput {
    fn from(tag: String) -> Self {
        Self::One(tag)
    }
}

impl From<Vec<String>> for TagInput {
    fn from(tags: Vec<String>) -> Self {
        Self::Many(tags)
    }
}

impl From<Vec<&str>> for TagInput {
    fn from(tags: Vec<&str>) -> Self {
        Self::Many(tags.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for TagInput {
    fn from(tags: &[&str]) -> Self {
        Self::Many(tags.iter().map(|t| t.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for TagInput {
    fn from(tags: [&str; N]) -> Self {
        Self::Many(tags.iter().map(|t| t.to_string()).collect())
    }
}

/// Context the host hands to `set`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetContext {
    #[serde(default)]
    pub tags: TagInput,
}

impl SetContext {
    pub fn with_tags(tags: impl Into<TagInput>) -> Self {
        Self { tags: tags.into() }
    }
}
