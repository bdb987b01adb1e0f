//! Store error taxonomy.

use forge_guard_core::ObjectKey;
use thiserror::Error;

/// Error from a store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist.
    #[error("object not found: {0}")]
    NotFound(ObjectKey),

    /// An object with that key already exists.
    #[error("object already exists: {0}")]
    AlreadyExists(ObjectKey),

    /// The presented resource version is stale; re-read and retry.
    #[error("write conflict on {key}: expected version {expected}, got {presented}")]
    Conflict {
        key: ObjectKey,
        expected: u64,
        presented: u64,
    },

    /// Transport or backend failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether a fresh read-modify-write cycle may succeed.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
