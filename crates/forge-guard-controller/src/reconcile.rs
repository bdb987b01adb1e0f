//! Reconcile invocation outcome.

use std::time::Duration;

/// What the runner should do with the key after a reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing further; the next watch event re-triggers the key.
    Done,
    /// Re-enqueue immediately.
    Requeue,
    /// Re-enqueue after the given delay (rate-limit resets, registry
    /// waits, TTL maintenance).
    RequeueAfter(Duration),
}

impl ReconcileOutcome {
    /// Result label recorded in the reconcile metrics.
    #[must_use]
    pub fn result_label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Done => "success",
            ReconcileOutcome::Requeue | ReconcileOutcome::RequeueAfter(_) => "requeue",
        }
    }
}
