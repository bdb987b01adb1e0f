//! Process-wide client registries.
//!
//! The only global mutable state in the engine: the authenticated forge
//! clients and the three member-source registries. Initialized empty and
//! populated as each resource reaches `running`; entries are overwritten
//! on credential rotation. No teardown is needed at shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use forge_guard_connector::ProviderRegistry;
use forge_guard_forge::ForgeApi;

/// Forge-name-keyed registry of authenticated forge clients.
pub struct ForgeRegistry {
    clients: RwLock<HashMap<String, Arc<dyn ForgeApi>>>,
}

impl ForgeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, name: impl Into<String>, client: Arc<dyn ForgeApi>) {
        self.clients.write().await.insert(name.into(), client);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn ForgeApi>> {
        self.clients.read().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

impl Default for ForgeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ForgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgeRegistry").finish_non_exhaustive()
    }
}

/// All client registries bundled for the reconcilers.
#[derive(Debug, Default)]
pub struct Registries {
    pub forges: ForgeRegistry,
    pub directory_providers: ProviderRegistry,
    pub http_providers: ProviderRegistry,
    pub static_providers: ProviderRegistry,
}

impl Registries {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
