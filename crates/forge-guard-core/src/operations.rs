//! Queued forge-side operations and their lifecycle states.
//!
//! Operations are appended to a resource status by the change calculators
//! and executed by the owning reconciler. Within one operation's lifetime
//! reaching a terminal state is monotonic; queues are append-only within a
//! reconcile pass and only trimmed by the TTL / clean-label maintenance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a queued change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Grant membership / permission.
    Add,
    /// Revoke membership / permission.
    Remove,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Remove => "remove",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ParseOperationKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "add" => Ok(OperationKind::Add),
            "remove" => Ok(OperationKind::Remove),
            _ => Err(ParseOperationKindError(s.to_string())),
        }
    }
}

/// Error parsing an operation kind from a string.
#[derive(Debug, Clone)]
pub struct ParseOperationKindError(String);

impl fmt::Display for ParseOperationKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid operation kind '{}', expected add or remove", self.0)
    }
}

impl std::error::Error for ParseOperationKindError {}

/// Lifecycle state of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    /// Waiting to be executed against the forge.
    #[default]
    Pending,
    /// Executed successfully.
    Complete,
    /// Execution failed; the error field carries the cause.
    Failed,
    /// Blocked by a label gate or a tolerated forge refusal.
    Skipped,
    /// The target user does not exist on the forge (membership adds only).
    NotFound,
}

impl OperationState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Pending => "pending",
            OperationState::Complete => "complete",
            OperationState::Failed => "failed",
            OperationState::Skipped => "skipped",
            OperationState::NotFound => "notfound",
        }
    }

    /// Terminal states are left in place until a TTL or clean label removes them.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationState::Pending)
    }

    /// All states an operation can be in.
    #[must_use]
    pub fn all() -> &'static [OperationState] {
        &[
            OperationState::Pending,
            OperationState::Complete,
            OperationState::Failed,
            OperationState::Skipped,
            OperationState::NotFound,
        ]
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationState {
    type Err = ParseOperationStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OperationState::Pending),
            "complete" => Ok(OperationState::Complete),
            "failed" => Ok(OperationState::Failed),
            "skipped" => Ok(OperationState::Skipped),
            "notfound" => Ok(OperationState::NotFound),
            _ => Err(ParseOperationStateError(s.to_string())),
        }
    }
}

/// Error parsing an operation state from a string.
#[derive(Debug, Clone)]
pub struct ParseOperationStateError(String);

impl fmt::Display for ParseOperationStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid operation state '{}', expected one of: pending, complete, failed, skipped, notfound",
            self.0
        )
    }
}

impl std::error::Error for ParseOperationStateError {}

/// Repository permission granted to a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Admin,
    Push,
    Pull,
}

impl Permission {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Admin => "admin",
            Permission::Push => "push",
            Permission::Pull => "pull",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Permission {
    type Err = ParsePermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Permission::Admin),
            "push" => Ok(Permission::Push),
            "pull" => Ok(Permission::Pull),
            _ => Err(ParsePermissionError(s.to_string())),
        }
    }
}

/// Error parsing a permission from a string.
#[derive(Debug, Clone)]
pub struct ParsePermissionError(String);

impl fmt::Display for ParsePermissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid permission '{}', expected one of: admin, push, pull",
            self.0
        )
    }
}

impl std::error::Error for ParsePermissionError {}

/// A queued membership change for a user (team member or org owner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub operation: OperationKind,
    pub user: String,
    pub state: OperationState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl UserOperation {
    /// New pending operation for `user`.
    #[must_use]
    pub fn pending(operation: OperationKind, user: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            operation,
            user: user.into(),
            state: OperationState::Pending,
            error: String::new(),
            timestamp: now,
        }
    }

    /// Move the operation to a terminal state, recording the cause if any.
    pub fn finish(&mut self, state: OperationState, error: Option<String>, now: DateTime<Utc>) {
        self.state = state;
        self.error = error.unwrap_or_default();
        self.timestamp = now;
    }

    /// Whether this operation tracks `user` (case-insensitive) with `kind`.
    #[must_use]
    pub fn matches(&self, kind: OperationKind, user: &str) -> bool {
        self.operation == kind && self.user.eq_ignore_ascii_case(user)
    }
}

/// A queued create/delete of a team at the organization level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamOperation {
    pub operation: OperationKind,
    pub team: String,
    pub state: OperationState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl TeamOperation {
    #[must_use]
    pub fn pending(operation: OperationKind, team: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            operation,
            team: team.into(),
            state: OperationState::Pending,
            error: String::new(),
            timestamp: now,
        }
    }

    pub fn finish(&mut self, state: OperationState, error: Option<String>, now: DateTime<Utc>) {
        self.state = state;
        self.error = error.unwrap_or_default();
        self.timestamp = now;
    }

    #[must_use]
    pub fn matches(&self, kind: OperationKind, team: &str) -> bool {
        self.operation == kind && self.team.eq_ignore_ascii_case(team)
    }
}

/// A queued change of a team's permission on a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoTeamOperation {
    pub operation: OperationKind,
    pub repo: String,
    pub team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<Permission>,
    pub state: OperationState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl RepoTeamOperation {
    /// New pending grant of `permission` to `team` on `repo`.
    #[must_use]
    pub fn pending_add(
        repo: impl Into<String>,
        team: impl Into<String>,
        permission: Permission,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            operation: OperationKind::Add,
            repo: repo.into(),
            team: team.into(),
            permission: Some(permission),
            state: OperationState::Pending,
            error: String::new(),
            timestamp: now,
        }
    }

    /// New pending revocation of `team` from `repo`.
    #[must_use]
    pub fn pending_remove(
        repo: impl Into<String>,
        team: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            operation: OperationKind::Remove,
            repo: repo.into(),
            team: team.into(),
            permission: None,
            state: OperationState::Pending,
            error: String::new(),
            timestamp: now,
        }
    }

    pub fn finish(&mut self, state: OperationState, error: Option<String>, now: DateTime<Utc>) {
        self.state = state;
        self.error = error.unwrap_or_default();
        self.timestamp = now;
    }

    #[must_use]
    pub fn matches(&self, kind: OperationKind, repo: &str, team: &str) -> bool {
        self.operation == kind && self.repo == repo && self.team.eq_ignore_ascii_case(team)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_state_round_trip() {
        for state in OperationState::all() {
            let parsed: OperationState = state.as_str().parse().unwrap();
            assert_eq!(parsed, *state);
        }
        assert!("unknown".parse::<OperationState>().is_err());
    }

    #[test]
    fn test_operation_state_terminal() {
        assert!(!OperationState::Pending.is_terminal());
        assert!(OperationState::Complete.is_terminal());
        assert!(OperationState::Failed.is_terminal());
        assert!(OperationState::Skipped.is_terminal());
        assert!(OperationState::NotFound.is_terminal());
    }

    #[test]
    fn test_permission_round_trip() {
        assert_eq!("admin".parse::<Permission>().unwrap(), Permission::Admin);
        assert_eq!("Push".parse::<Permission>().unwrap(), Permission::Push);
        assert_eq!("pull".parse::<Permission>().unwrap(), Permission::Pull);
        assert!("write".parse::<Permission>().is_err());
    }

    #[test]
    fn test_user_operation_matches_case_insensitively() {
        let op = UserOperation::pending(OperationKind::Add, "OctoCat", Utc::now());
        assert!(op.matches(OperationKind::Add, "octocat"));
        assert!(!op.matches(OperationKind::Remove, "octocat"));
        assert!(!op.matches(OperationKind::Add, "other"));
    }

    #[test]
    fn test_finish_records_error_and_timestamp() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(5);
        let mut op = UserOperation::pending(OperationKind::Remove, "u1", t0);
        op.finish(OperationState::Failed, Some("boom".to_string()), t1);
        assert_eq!(op.state, OperationState::Failed);
        assert_eq!(op.error, "boom");
        assert_eq!(op.timestamp, t1);
    }

    #[test]
    fn test_wire_serialization() {
        let op = RepoTeamOperation::pending_add("repo1", "eng", Permission::Push, Utc::now());
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["operation"], "add");
        assert_eq!(json["state"], "pending");
        assert_eq!(json["permission"], "push");
    }
}
