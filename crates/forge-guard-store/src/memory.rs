//! In-memory store implementation.
//!
//! Backs the controller harness and the test suites. Versions are drawn
//! from a per-store counter; both update paths go through the same
//! compare-and-update gate. The status subresource is not isolated from
//! the rest of the object here — reconcilers re-read before every write,
//! which is all the engine relies on.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use forge_guard_core::{ObjectKey, StoreObject};

use crate::error::{StoreError, StoreResult};
use crate::watch::WatchEvent;
use crate::ResourceStore;

const WATCH_CHANNEL_CAPACITY: usize = 256;

/// Thread-safe in-memory store for one resource kind.
pub struct MemoryStore<T: StoreObject> {
    objects: RwLock<HashMap<ObjectKey, T>>,
    version: AtomicU64,
    events: broadcast::Sender<WatchEvent<T>>,
}

impl<T: StoreObject> MemoryStore<T> {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Arc::new(Self {
            objects: RwLock::new(HashMap::new()),
            version: AtomicU64::new(1),
            events,
        })
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst)
    }

    fn emit(&self, event: WatchEvent<T>) {
        // No receivers is fine; watches are optional.
        let _ = self.events.send(event);
    }

    async fn write(&self, mut object: T) -> StoreResult<T> {
        let key = object.key();
        let mut objects = self.objects.write().await;
        let Some(stored) = objects.get(&key) else {
            return Err(StoreError::NotFound(key));
        };
        let expected = stored.metadata().resource_version;
        let presented = object.metadata().resource_version;
        if expected != presented {
            return Err(StoreError::Conflict {
                key,
                expected,
                presented,
            });
        }
        object.metadata_mut().resource_version = self.next_version();
        objects.insert(key, object.clone());
        drop(objects);
        self.emit(WatchEvent::Modified(object.clone()));
        Ok(object)
    }
}

#[async_trait]
impl<T: StoreObject> ResourceStore<T> for MemoryStore<T> {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<T>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<T>> {
        let mut items: Vec<T> = self.objects.read().await.values().cloned().collect();
        items.sort_by_key(|obj| obj.key());
        Ok(items)
    }

    async fn create(&self, mut object: T) -> StoreResult<T> {
        let key = object.key();
        let mut objects = self.objects.write().await;
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }
        object.metadata_mut().resource_version = self.next_version();
        objects.insert(key, object.clone());
        drop(objects);
        self.emit(WatchEvent::Added(object.clone()));
        Ok(object)
    }

    async fn update(&self, object: T) -> StoreResult<T> {
        self.write(object).await
    }

    async fn update_status(&self, object: T) -> StoreResult<T> {
        self.write(object).await
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        let removed = self.objects.write().await.remove(key);
        match removed {
            Some(object) => {
                self.emit(WatchEvent::Deleted(object));
                Ok(())
            }
            None => Err(StoreError::NotFound(key.clone())),
        }
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent<T>> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_guard_core::team::Team;
    use forge_guard_core::ObjectMeta;

    fn team(name: &str) -> Team {
        Team {
            metadata: ObjectMeta::named(name),
            ..Team::default()
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let store = MemoryStore::<Team>::new();
        let created = store.create(team("eng")).await.unwrap();
        assert!(created.metadata.resource_version > 0);

        let key = created.key();
        let fetched = store.get(&key).await.unwrap().unwrap();
        assert_eq!(fetched.metadata.name, "eng");

        store.delete(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
        assert!(store.delete(&key).await.is_err());
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let store = MemoryStore::<Team>::new();
        store.create(team("eng")).await.unwrap();
        let err = store.create(team("eng")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected() {
        let store = MemoryStore::<Team>::new();
        let stale = store.create(team("eng")).await.unwrap();

        // A concurrent writer bumps the version.
        let current = store.get(&stale.key()).await.unwrap().unwrap();
        store.update_status(current).await.unwrap();

        let err = store.update_status(stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let store = MemoryStore::<Team>::new();
        let v1 = store.create(team("eng")).await.unwrap();
        let v2 = store.update(v1.clone()).await.unwrap();
        assert!(v2.metadata.resource_version > v1.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_watch_sees_lifecycle() {
        let store = MemoryStore::<Team>::new();
        let mut watch = store.watch();

        let created = store.create(team("eng")).await.unwrap();
        store.update(created.clone()).await.unwrap();
        store.delete(&created.key()).await.unwrap();

        assert!(matches!(watch.recv().await.unwrap(), WatchEvent::Added(_)));
        assert!(matches!(
            watch.recv().await.unwrap(),
            WatchEvent::Modified(_)
        ));
        assert!(matches!(
            watch.recv().await.unwrap(),
            WatchEvent::Deleted(_)
        ));
    }

    #[tokio::test]
    async fn test_list_is_sorted_by_key() {
        let store = MemoryStore::<Team>::new();
        store.create(team("zeta")).await.unwrap();
        store.create(team("alpha")).await.unwrap();
        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.metadata.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
