use crate::constants::{ENTRY_NAMESPACE, TAG_NAMESPACE};

/// Builds namespaced store keys
///
/// Entries live under `{prefix}entry:` and tag indices under `{prefix}tag:`,
/// so a caller key can never collide with a tag index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    prefix: String,
}

impl KeyNamespace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn entry_key(&self, key: &str) -> String {
        format!("{}{}{}", self.prefix, ENTRY_NAMESPACE, key)
    }

    pub fn tag_key(&self, tag: &str) -> String {
        format!("{}{}{}", self.prefix, TAG_NAMESPACE, tag)
    }
}
