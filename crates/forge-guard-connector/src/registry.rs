//! Runtime registry of constructed member sources.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::source::MemberSource;

/// Name-keyed registry of live member sources.
///
/// Populated by the provider reconcilers once a source reaches `running`;
/// read by the Team reconciler on every pass. Entries are overwritten on
/// credential rotation; readers always observe either the old or the new
/// fully-constructed source.
pub struct ProviderRegistry {
    sources: RwLock<HashMap<String, Arc<dyn MemberSource>>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, name: impl Into<String>, source: Arc<dyn MemberSource>) {
        self.sources.write().await.insert(name.into(), source);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn MemberSource>> {
        self.sources.read().await.get(name).cloned()
    }

    pub async fn remove(&self, name: &str) -> Option<Arc<dyn MemberSource>> {
        self.sources.write().await.remove(name)
    }

    pub async fn len(&self) -> usize {
        self.sources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sources.read().await.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry").finish_non_exhaustive()
    }
}
