//! The member source capability.

use async_trait::async_trait;

use crate::error::ConnectorResult;

/// Anything that can resolve a group name into member identifiers.
///
/// Implementations must honor cancellation (calls are awaited inside a
/// reconcile that can be aborted) and keep a single call bounded by their
/// configured request timeout.
#[async_trait]
pub trait MemberSource: Send + Sync {
    /// The member identifiers of `group`. An unknown group yields an
    /// empty list, not an error.
    async fn users(&self, group: &str) -> ConnectorResult<Vec<String>>;

    /// Cheap credential/reachability probe used at registration time.
    async fn test_connection(&self) -> ConnectorResult<()>;
}
