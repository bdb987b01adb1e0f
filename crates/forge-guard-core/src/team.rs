//! Team resource and its membership change calculator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::impl_store_object;
use crate::member::Member;
use crate::metadata::ObjectMeta;
use crate::operations::{OperationKind, OperationState, UserOperation};
use crate::state::SyncState;

/// A forge team whose membership is managed from a member source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TeamSpec,
    #[serde(default)]
    pub status: TeamStatus,
}

impl_store_object!(Team, "Team");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub forge: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organization: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub team: String,
    /// Name of the sibling group-system team to source members from.
    /// Mutually exclusive with `external_member_provider`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greenhouse_team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_member_provider: Option<ExternalMemberProvider>,
}

/// Tagged reference to one of the external member provider variants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMemberProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<ProviderRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<ProviderRef>,
    #[serde(rename = "static", default, skip_serializing_if = "Option::is_none")]
    pub static_: Option<ProviderRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
}

/// Which provider variant a team uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Directory,
    Http,
    Static,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderKind::Directory => "directory",
            ProviderKind::Http => "http",
            ProviderKind::Static => "static",
        };
        write!(f, "{s}")
    }
}

impl ExternalMemberProvider {
    /// How many variants are configured; more than one is a spec error.
    #[must_use]
    pub fn variants_set(&self) -> usize {
        [
            self.directory.is_some(),
            self.http.is_some(),
            self.static_.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// The single configured variant, if exactly one is set.
    #[must_use]
    pub fn selected(&self) -> Option<(ProviderKind, &ProviderRef)> {
        if self.variants_set() != 1 {
            return None;
        }
        if let Some(r) = &self.directory {
            return Some((ProviderKind::Directory, r));
        }
        if let Some(r) = &self.http {
            return Some((ProviderKind::Http, r));
        }
        self.static_.as_ref().map(|r| (ProviderKind::Static, r))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_status: Option<SyncState>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<UserOperation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Member>,
}

impl TeamStatus {
    #[must_use]
    pub fn pending_operations_found(&self) -> bool {
        self.operations
            .iter()
            .any(|op| op.state == OperationState::Pending)
    }

    #[must_use]
    pub fn failed_operations_found(&self) -> bool {
        self.operations
            .iter()
            .any(|op| op.state == OperationState::Failed)
    }

    /// State implied by the residual operation queue.
    #[must_use]
    pub fn recomputed_state(&self) -> SyncState {
        if self.pending_operations_found() {
            SyncState::Pending
        } else if self.failed_operations_found() {
            SyncState::Failed
        } else {
            SyncState::Complete
        }
    }

    pub fn set_state(&mut self, state: SyncState, error: impl Into<String>, now: DateTime<Utc>) {
        self.team_status = Some(state);
        self.error = error.into();
        self.timestamp = Some(now);
    }
}

impl Team {
    /// Diff desired members against the observed members and append the
    /// missing operations.
    ///
    /// Returns the updated status when anything changed, `None` otherwise.
    /// A pure function of `(status, desired, now)`: an add is suppressed by
    /// a prior operation for the same login in pending/complete/skipped/
    /// notfound, a remove by pending/complete/skipped, and a login whose
    /// most recent operation ended `notfound` is not re-added at all.
    #[must_use]
    pub fn change_calculator(&self, desired: &[Member], now: DateTime<Utc>) -> Option<TeamStatus> {
        let mut new_status = self.status.clone();
        let mut changed = false;

        let current: HashMap<String, &Member> = self
            .status
            .members
            .iter()
            .map(|m| (m.login.to_lowercase(), m))
            .collect();

        // Last operation state per login; later entries win.
        let mut last_state: HashMap<String, OperationState> = HashMap::new();
        for op in &new_status.operations {
            last_state.insert(op.user.to_lowercase(), op.state);
        }

        for member in desired {
            let lowered = member.login.to_lowercase();
            if last_state.get(&lowered) == Some(&OperationState::NotFound) {
                continue;
            }
            if current.contains_key(&lowered) {
                continue;
            }
            let tracked = new_status.operations.iter().any(|op| {
                op.matches(OperationKind::Add, &member.login)
                    && matches!(
                        op.state,
                        OperationState::Pending
                            | OperationState::Complete
                            | OperationState::Skipped
                            | OperationState::NotFound
                    )
            });
            if !tracked {
                new_status
                    .operations
                    .push(UserOperation::pending(OperationKind::Add, &member.login, now));
                changed = true;
            }
        }

        let desired_map: HashMap<String, &Member> = desired
            .iter()
            .map(|m| (m.login.to_lowercase(), m))
            .collect();

        for member in &self.status.members {
            if desired_map.contains_key(&member.login.to_lowercase()) {
                continue;
            }
            let tracked = new_status.operations.iter().any(|op| {
                op.matches(OperationKind::Remove, &member.login)
                    && matches!(
                        op.state,
                        OperationState::Pending
                            | OperationState::Complete
                            | OperationState::Skipped
                    )
            });
            if !tracked {
                new_status.operations.push(UserOperation::pending(
                    OperationKind::Remove,
                    &member.login,
                    now,
                ));
                changed = true;
            }
        }

        if changed {
            new_status.team_status = Some(SyncState::Pending);
            new_status.timestamp = Some(now);
            Some(new_status)
        } else {
            None
        }
    }

    /// Drop all operations in `state`, recomputing the aggregate status
    /// from the residue. Returns the updated status when anything was
    /// removed (or, for failed cleanup, when a status error was cleared).
    #[must_use]
    pub fn clean_operations_in_state(
        &self,
        state: OperationState,
        now: DateTime<Utc>,
    ) -> Option<TeamStatus> {
        let mut new_status = self.status.clone();
        new_status.operations.retain(|op| op.state != state);

        let mut changed = new_status.operations.len() != self.status.operations.len();
        if state == OperationState::Failed && !new_status.error.is_empty() {
            new_status.error.clear();
            changed = true;
        }
        if !changed {
            return None;
        }

        new_status.team_status = Some(new_status.recomputed_state());
        new_status.timestamp = Some(now);
        Some(new_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team_with(members: Vec<Member>, operations: Vec<UserOperation>) -> Team {
        Team {
            metadata: ObjectMeta::named("main--org1--eng"),
            spec: TeamSpec {
                forge: "main".to_string(),
                organization: "org1".to_string(),
                team: "eng".to_string(),
                greenhouse_team: Some("eng".to_string()),
                external_member_provider: None,
            },
            status: TeamStatus {
                members,
                operations,
                ..TeamStatus::default()
            },
        }
    }

    #[test]
    fn test_add_operation_for_new_member() {
        let team = team_with(vec![], vec![]);
        let desired = vec![Member::new("U1", "u1")];

        let status = team.change_calculator(&desired, Utc::now()).unwrap();
        assert_eq!(status.operations.len(), 1);
        assert_eq!(status.operations[0].operation, OperationKind::Add);
        assert_eq!(status.operations[0].user, "u1");
        assert_eq!(status.operations[0].state, OperationState::Pending);
        assert_eq!(status.team_status, Some(SyncState::Pending));
    }

    #[test]
    fn test_remove_operation_for_extra_member() {
        let team = team_with(vec![Member::new("U1", "u1")], vec![]);

        let status = team.change_calculator(&[], Utc::now()).unwrap();
        assert_eq!(status.operations.len(), 1);
        assert_eq!(status.operations[0].operation, OperationKind::Remove);
        assert_eq!(status.operations[0].user, "u1");
    }

    #[test]
    fn test_no_change_when_converged() {
        let team = team_with(vec![Member::new("U1", "u1")], vec![]);
        let desired = vec![Member::new("U1", "u1")];
        assert!(team.change_calculator(&desired, Utc::now()).is_none());
    }

    #[test]
    fn test_no_duplicate_pending_add() {
        let now = Utc::now();
        let team = team_with(
            vec![],
            vec![UserOperation::pending(OperationKind::Add, "u1", now)],
        );
        // Same user, different case: still tracked.
        let desired = vec![Member::new("U1", "U1")];
        assert!(team.change_calculator(&desired, now).is_none());
    }

    #[test]
    fn test_notfound_user_not_requeued() {
        let now = Utc::now();
        let mut op = UserOperation::pending(OperationKind::Add, "ghost", now);
        op.finish(OperationState::NotFound, Some("user not found".to_string()), now);
        let team = team_with(vec![], vec![op]);

        let desired = vec![Member::new("GHOST", "ghost")];
        assert!(team.change_calculator(&desired, now).is_none());
    }

    #[test]
    fn test_failed_add_is_not_retried_until_cleaned() {
        let now = Utc::now();
        let mut op = UserOperation::pending(OperationKind::Add, "u1", now);
        op.finish(OperationState::Failed, Some("boom".to_string()), now);
        let team = team_with(vec![], vec![op]);

        // A failed add does not block a fresh attempt.
        let desired = vec![Member::new("U1", "u1")];
        let status = team.change_calculator(&desired, now).unwrap();
        assert_eq!(status.operations.len(), 2);
    }

    #[test]
    fn test_calculator_is_deterministic() {
        let now = Utc::now();
        let team = team_with(vec![Member::new("U1", "u1")], vec![]);
        let desired = vec![Member::new("U2", "u2")];
        let a = team.change_calculator(&desired, now).unwrap();
        let b = team.change_calculator(&desired, now).unwrap();
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }

    #[test]
    fn test_clean_failed_operations_resets_error() {
        let now = Utc::now();
        let mut op = UserOperation::pending(OperationKind::Add, "u1", now);
        op.finish(OperationState::Failed, Some("boom".to_string()), now);
        let mut team = team_with(vec![], vec![op]);
        team.status.set_state(SyncState::Failed, "boom", now);

        let cleaned = team
            .clean_operations_in_state(OperationState::Failed, now)
            .unwrap();
        assert!(cleaned.operations.is_empty());
        assert!(cleaned.error.is_empty());
        assert_eq!(cleaned.team_status, Some(SyncState::Complete));

        // Idempotent: applying again with the same clock changes nothing.
        let team_after = Team {
            status: cleaned,
            ..team.clone()
        };
        assert!(team_after
            .clean_operations_in_state(OperationState::Failed, now)
            .is_none());
    }

    #[test]
    fn test_clean_completed_keeps_pending() {
        let now = Utc::now();
        let mut done = UserOperation::pending(OperationKind::Add, "u1", now);
        done.finish(OperationState::Complete, None, now);
        let waiting = UserOperation::pending(OperationKind::Add, "u2", now);
        let team = team_with(vec![], vec![done, waiting]);

        let cleaned = team
            .clean_operations_in_state(OperationState::Complete, now)
            .unwrap();
        assert_eq!(cleaned.operations.len(), 1);
        assert_eq!(cleaned.operations[0].user, "u2");
        assert_eq!(cleaned.team_status, Some(SyncState::Pending));
    }

    #[test]
    fn test_provider_variant_selection() {
        let mut emp = ExternalMemberProvider::default();
        assert_eq!(emp.variants_set(), 0);
        assert!(emp.selected().is_none());

        emp.http = Some(ProviderRef {
            provider: "corp-api".to_string(),
            group: "eng".to_string(),
        });
        let (kind, r) = emp.selected().unwrap();
        assert_eq!(kind, ProviderKind::Http);
        assert_eq!(r.provider, "corp-api");

        emp.static_ = Some(ProviderRef::default());
        assert_eq!(emp.variants_set(), 2);
        assert!(emp.selected().is_none());
    }
}
