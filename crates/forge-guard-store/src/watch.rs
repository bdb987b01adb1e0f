//! Watch events emitted on every successful store write.

use forge_guard_core::StoreObject;

/// A change notification for one object.
///
/// Events are broadcast best-effort: a slow subscriber can lose events
/// (`RecvError::Lagged`), which the controller tolerates by re-listing on
/// its next reconcile of the affected key.
#[derive(Debug, Clone)]
pub enum WatchEvent<T: StoreObject> {
    Added(T),
    Modified(T),
    Deleted(T),
}

impl<T: StoreObject> WatchEvent<T> {
    /// The object the event refers to.
    #[must_use]
    pub fn object(&self) -> &T {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => obj,
        }
    }
}
