//! Cluster secrets read by the Forge and provider reconcilers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use forge_guard_core::{impl_store_object, ObjectMeta};

/// An opaque secret holding ASCII byte-strings under well-known keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl_store_object!(Secret, "Secret");

impl Secret {
    #[must_use]
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            metadata,
            data: BTreeMap::new(),
        }
    }

    /// Insert a string value under `key`.
    #[must_use]
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into().into_bytes());
        self
    }

    /// The value under `key` decoded as UTF-8, if present and valid.
    #[must_use]
    pub fn string_data(&self, key: &str) -> Option<String> {
        self.data
            .get(key)
            .and_then(|bytes| String::from_utf8(bytes.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_data() {
        let secret = Secret::new(ObjectMeta::named("forge-credentials"))
            .with_entry("clientID", "abc123");
        assert_eq!(secret.string_data("clientID"), Some("abc123".to_string()));
        assert_eq!(secret.string_data("missing"), None);
    }

    #[test]
    fn test_non_utf8_is_none() {
        let mut secret = Secret::new(ObjectMeta::named("s"));
        secret.data.insert("raw".to_string(), vec![0xff, 0xfe]);
        assert_eq!(secret.string_data("raw"), None);
    }
}
