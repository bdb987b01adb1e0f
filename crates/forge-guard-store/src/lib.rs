//! # forge-guard store
//!
//! The coordination-store surface the engine reconciles against: typed
//! CRUD with optimistic concurrency, a status subresource, and per-kind
//! watch streams. The store itself is an external collaborator; this
//! crate defines the contract plus an in-memory implementation that backs
//! the controller harness and the test suites.

pub mod error;
pub mod memory;
pub mod secret;
pub mod watch;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use secret::Secret;
pub use watch::WatchEvent;

use async_trait::async_trait;
use forge_guard_core::{ObjectKey, StoreObject};
use tokio::sync::broadcast;

/// Typed CRUD + watch access to one resource kind.
///
/// `update` and `update_status` implement compare-and-update: the object
/// must carry the `resource_version` the caller read, and a mismatch
/// yields [`StoreError::Conflict`] so the reconciler can dequeue afresh.
#[async_trait]
pub trait ResourceStore<T: StoreObject>: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<T>>;

    async fn list(&self) -> StoreResult<Vec<T>>;

    async fn create(&self, object: T) -> StoreResult<T>;

    /// Replace the object (spec and metadata) under optimistic concurrency.
    async fn update(&self, object: T) -> StoreResult<T>;

    /// Replace the status subresource under optimistic concurrency.
    async fn update_status(&self, object: T) -> StoreResult<T>;

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()>;

    /// Subscribe to change events for this kind.
    fn watch(&self) -> broadcast::Receiver<WatchEvent<T>>;
}
