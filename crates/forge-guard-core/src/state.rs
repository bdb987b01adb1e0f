//! Top-level reconciliation state shared by Team and Organization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aggregate state of a reconciled resource.
///
/// `∅ → complete ↔ pending → {complete, failed, dry-run, ratelimited}`;
/// `ratelimited` falls back to pending/complete/failed once the reset
/// time stored in the status error has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncState {
    /// Operations are queued and waiting for execution.
    #[serde(rename = "pending")]
    Pending,
    /// An operation or a validation failed; see the status error.
    #[serde(rename = "failed")]
    Failed,
    /// Observed state matches desired state; no pending work.
    #[serde(rename = "complete")]
    Complete,
    /// Mutations are suspended by the dryRun label.
    #[serde(rename = "dry-run")]
    DryRun,
    /// A forge rate limit is in effect until the reset stored in the error.
    #[serde(rename = "ratelimited")]
    RateLimited,
}

impl SyncState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Failed => "failed",
            SyncState::Complete => "complete",
            SyncState::DryRun => "dry-run",
            SyncState::RateLimited => "ratelimited",
        }
    }

    /// All states, for metrics one-hot gauges.
    #[must_use]
    pub fn all() -> &'static [SyncState] {
        &[
            SyncState::Pending,
            SyncState::Failed,
            SyncState::Complete,
            SyncState::DryRun,
            SyncState::RateLimited,
        ]
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = ParseSyncStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncState::Pending),
            "failed" => Ok(SyncState::Failed),
            "complete" => Ok(SyncState::Complete),
            "dry-run" => Ok(SyncState::DryRun),
            "ratelimited" => Ok(SyncState::RateLimited),
            _ => Err(ParseSyncStateError(s.to_string())),
        }
    }
}

/// Error parsing a sync state from a string.
#[derive(Debug, Clone)]
pub struct ParseSyncStateError(String);

impl fmt::Display for ParseSyncStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid sync state '{}', expected one of: pending, failed, complete, dry-run, ratelimited",
            self.0
        )
    }
}

impl std::error::Error for ParseSyncStateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for state in SyncState::all() {
            assert_eq!(state.as_str().parse::<SyncState>().unwrap(), *state);
        }
        assert!("running".parse::<SyncState>().is_err());
    }

    #[test]
    fn test_dry_run_wire_string() {
        assert_eq!(
            serde_json::to_string(&SyncState::DryRun).unwrap(),
            "\"dry-run\""
        );
    }
}
