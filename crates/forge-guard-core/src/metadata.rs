//! Object metadata shared by every store resource.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata carried by every resource in the coordination store.
///
/// `labels` hold process-level policy switches, `annotations` hold
/// unbounded free-form metadata. `resource_version` backs the store's
/// optimistic concurrency: updates must present the version they read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub resource_version: u64,
}

impl ObjectMeta {
    /// Metadata with a name in the default namespace.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Metadata with a name and namespace.
    #[must_use]
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Label value, if present.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Annotation value, if present.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Whether the label is set to the literal `"true"`.
    #[must_use]
    pub fn label_is_true(&self, key: &str) -> bool {
        self.label(key) == Some("true")
    }

    /// The `(namespace, name)` address of this object.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

/// Address of a resource in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Implemented by every resource kind held in the store.
pub trait StoreObject: Clone + Send + Sync + 'static {
    /// Kind name used in logs, metrics and watch plumbing.
    const KIND: &'static str;

    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// The `(namespace, name)` address of this object.
    fn key(&self) -> ObjectKey {
        self.metadata().key()
    }
}

/// Implements [`StoreObject`] for a resource struct with a `metadata` field.
#[macro_export]
macro_rules! impl_store_object {
    ($ty:ty, $kind:literal) => {
        impl $crate::metadata::StoreObject for $ty {
            const KIND: &'static str = $kind;

            fn metadata(&self) -> &$crate::metadata::ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut $crate::metadata::ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_helpers() {
        let mut meta = ObjectMeta::named("eng");
        meta.labels.insert("dryRun".to_string(), "true".to_string());
        meta.labels
            .insert("removeUser".to_string(), "false".to_string());

        assert!(meta.label_is_true("dryRun"));
        assert!(!meta.label_is_true("removeUser"));
        assert!(!meta.label_is_true("missing"));
        assert_eq!(meta.label("removeUser"), Some("false"));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ObjectKey::new("", "a").to_string(), "a");
        assert_eq!(ObjectKey::new("ns", "a").to_string(), "ns/a");
    }
}
