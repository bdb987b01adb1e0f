//! Controller error type.

use thiserror::Error;

use forge_guard_connector::ConnectorError;
use forge_guard_forge::ForgeError;
use forge_guard_store::StoreError;

/// Error surfaced from a reconcile invocation.
///
/// Reconcilers absorb most failures into the resource status; what
/// escapes here is re-enqueued by the runner with a short delay. Store
/// write conflicts in particular just mean another event already
/// re-triggered the key.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("{0}")]
    Internal(String),
}

impl ControllerError {
    /// Whether this is an optimistic-concurrency conflict; the runner
    /// treats those as a silent fresh dequeue.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControllerError::Store(e) if e.is_conflict())
    }
}

/// Result type for reconcile invocations.
pub type ControllerResult<T> = Result<T, ControllerError>;
