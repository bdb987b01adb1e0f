//! Organization resource and its owner / team / repository calculators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::impl_store_object;
use crate::labels::ANNOTATION_SKIP_DEFAULT_REPOSITORY_TEAMS;
use crate::member::Member;
use crate::metadata::ObjectMeta;
use crate::operations::{
    OperationKind, OperationState, Permission, RepoTeamOperation, TeamOperation, UserOperation,
};
use crate::state::SyncState;
use crate::team_repository::TeamRepository;

/// A forge organization whose owners, teams and repository permissions are
/// managed by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: OrganizationSpec,
    #[serde(default)]
    pub status: OrganizationStatus,
}

impl_store_object!(Organization, "Organization");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub forge: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organization: String,
    /// Teams whose member union forms the desired owner set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organization_owner_teams: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_public_repository_teams: Vec<TeamWithPermission>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_private_repository_teams: Vec<TeamWithPermission>,
    /// Per-organization credential scope of the forge app.
    #[serde(default)]
    pub installation_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamWithPermission {
    pub team: String,
    pub permission: Permission,
}

impl TeamWithPermission {
    #[must_use]
    pub fn new(team: impl Into<String>, permission: Permission) -> Self {
        Self {
            team: team.into(),
            permission,
        }
    }
}

/// A repository together with its observed team permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teams: Vec<TeamWithPermission>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationStatus {
    /// Teams observed on the forge.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teams: Vec<String>,
    /// Repository lists are working state only and must never be persisted;
    /// only the compact out-of-policy set is stored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_repositories: Vec<Repository>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_repositories: Vec<Repository>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organization_owners: Vec<Member>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub out_of_policy_repositories: Vec<String>,
    #[serde(rename = "orgStatus", default, skip_serializing_if = "Option::is_none")]
    pub org_status: Option<SyncState>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub operations: OrganizationOperations,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationOperations {
    #[serde(rename = "ownerOps", default, skip_serializing_if = "Vec::is_empty")]
    pub owner_operations: Vec<UserOperation>,
    #[serde(rename = "teamOps", default, skip_serializing_if = "Vec::is_empty")]
    pub team_operations: Vec<TeamOperation>,
    #[serde(rename = "repoTeamOps", default, skip_serializing_if = "Vec::is_empty")]
    pub repository_team_operations: Vec<RepoTeamOperation>,
}

impl OrganizationStatus {
    #[must_use]
    pub fn pending_operations_found(&self) -> bool {
        self.operations
            .owner_operations
            .iter()
            .any(|op| op.state == OperationState::Pending)
            || self
                .operations
                .team_operations
                .iter()
                .any(|op| op.state == OperationState::Pending)
            || self
                .operations
                .repository_team_operations
                .iter()
                .any(|op| op.state == OperationState::Pending)
    }

    #[must_use]
    pub fn failed_operations_found(&self) -> bool {
        self.operations
            .owner_operations
            .iter()
            .any(|op| op.state == OperationState::Failed)
            || self
                .operations
                .team_operations
                .iter()
                .any(|op| op.state == OperationState::Failed)
            || self
                .operations
                .repository_team_operations
                .iter()
                .any(|op| op.state == OperationState::Failed)
    }

    /// State implied by the residual operation queues.
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
        self.org_status = Some(state);
        self.error = error.into();
        self.timestamp = Some(now);
    }

    /// Distinct repository names with a pending or failed repo-team
    /// operation; the persisted stand-in for the full repository lists.
    #[must_use]
    pub fn out_of_policy_from_operations(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = BTreeSet::new();
        for op in &self.operations.repository_team_operations {
            if matches!(op.state, OperationState::Pending | OperationState::Failed)
                && !op.repo.is_empty()
            {
                names.insert(op.repo.clone());
            }
        }
        names.into_iter().collect()
    }

    /// Drop the bulky repository lists before any status write.
    pub fn clear_repository_lists(&mut self) {
        self.public_repositories.clear();
        self.private_repositories.clear();
    }
}

impl Organization {
    /// Repositories named by the `skipDefaultRepositoryTeams` annotation.
    #[must_use]
    pub fn skip_default_repository_teams(&self) -> Vec<String> {
        self.metadata
            .annotation(ANNOTATION_SKIP_DEFAULT_REPOSITORY_TEAMS)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Diff the desired owner set against the observed owners and append
    /// the missing add/remove operations. Logins compare case-insensitively;
    /// an operation is suppressed while a prior one for the same login and
    /// kind has not completed.
    #[must_use]
    pub fn owner_change_calculator(
        &self,
        desired: &[Member],
        now: DateTime<Utc>,
    ) -> Option<OrganizationStatus> {
        let mut new_status = self.status.clone();
        let mut changed = false;

        for wanted in desired {
            let observed = self
                .status
                .organization_owners
                .iter()
                .any(|o| o.same_login(&wanted.login));
            if observed {
                continue;
            }
            let tracked = new_status.operations.owner_operations.iter().any(|op| {
                op.matches(OperationKind::Add, &wanted.login)
                    && op.state != OperationState::Complete
            });
            if !tracked {
                new_status
                    .operations
                    .owner_operations
                    .push(UserOperation::pending(OperationKind::Add, &wanted.login, now));
                changed = true;
            }
        }

        for observed in &self.status.organization_owners {
            let wanted = desired.iter().any(|m| m.same_login(&observed.login));
            if wanted {
                continue;
            }
            let tracked = new_status.operations.owner_operations.iter().any(|op| {
                op.matches(OperationKind::Remove, &observed.login)
                    && op.state != OperationState::Complete
            });
            if !tracked {
                new_status.operations.owner_operations.push(UserOperation::pending(
                    OperationKind::Remove,
                    &observed.login,
                    now,
                ));
                changed = true;
            }
        }

        if changed {
            new_status.set_state(SyncState::Pending, "", now);
            Some(new_status)
        } else {
            None
        }
    }

    /// Diff the desired team list against the teams observed on the forge.
    #[must_use]
    pub fn team_change_calculator(
        &self,
        desired: &[String],
        now: DateTime<Utc>,
    ) -> Option<OrganizationStatus> {
        let mut new_status = self.status.clone();
        let mut changed = false;

        for wanted in desired {
            let observed = self
                .status
                .teams
                .iter()
                .any(|t| t.eq_ignore_ascii_case(wanted));
            if observed {
                continue;
            }
            let tracked = new_status.operations.team_operations.iter().any(|op| {
                op.matches(OperationKind::Add, wanted) && op.state != OperationState::Complete
            });
            if !tracked {
                new_status
                    .operations
                    .team_operations
                    .push(TeamOperation::pending(OperationKind::Add, wanted, now));
                changed = true;
            }
        }

        for observed in &self.status.teams {
            let wanted = desired.iter().any(|t| t.eq_ignore_ascii_case(observed));
            if wanted {
                continue;
            }
            let tracked = new_status.operations.team_operations.iter().any(|op| {
                op.matches(OperationKind::Remove, observed) && op.state != OperationState::Complete
            });
            if !tracked {
                new_status
                    .operations
                    .team_operations
                    .push(TeamOperation::pending(OperationKind::Remove, observed, now));
                changed = true;
            }
        }

        if changed {
            new_status.set_state(SyncState::Pending, "", now);
            Some(new_status)
        } else {
            None
        }
    }

    /// Diff every observed repository against its effective team
    /// configuration (visibility defaults minus the skip list, plus the
    /// matching overrides) and append the missing repo-team operations.
    ///
    /// Empty visibility defaults are a spec error and fail the status.
    #[must_use]
    pub fn repo_change_calculator(
        &self,
        overrides: &[TeamRepository],
        now: DateTime<Utc>,
    ) -> Option<OrganizationStatus> {
        let mut new_status = self.status.clone();

        if self.spec.default_private_repository_teams.is_empty() {
            new_status.set_state(
                SyncState::Failed,
                "defaultPrivateRepositoryTeams is empty",
                now,
            );
            return Some(new_status);
        }
        if self.spec.default_public_repository_teams.is_empty() {
            new_status.set_state(
                SyncState::Failed,
                "defaultPublicRepositoryTeams is empty",
                now,
            );
            return Some(new_status);
        }

        let skip = self.skip_default_repository_teams();
        let existing = &self.status.operations.repository_team_operations;

        let mut new_ops = repo_team_operations(
            &self.spec.default_private_repository_teams,
            &self.status.private_repositories,
            overrides,
            &skip,
            existing,
            now,
        );
        new_ops.extend(repo_team_operations(
            &self.spec.default_public_repository_teams,
            &self.status.public_repositories,
            overrides,
            &skip,
            existing,
            now,
        ));

        if new_ops.is_empty() {
            return None;
        }
        new_status
            .operations
            .repository_team_operations
            .extend(new_ops);
        new_status.set_state(SyncState::Pending, "", now);
        Some(new_status)
    }

    /// Drop all operations in `state` across the three queues, recomputing
    /// the aggregate status from the residue.
    #[must_use]
    pub fn clean_operations_in_state(
        &self,
        state: OperationState,
        now: DateTime<Utc>,
    ) -> Option<OrganizationStatus> {
        let mut new_status = self.status.clone();
        new_status
            .operations
            .owner_operations
            .retain(|op| op.state != state);
        new_status
            .operations
            .team_operations
            .retain(|op| op.state != state);
        new_status
            .operations
            .repository_team_operations
            .retain(|op| op.state != state);

        let removed = new_status.operations.owner_operations.len()
            != self.status.operations.owner_operations.len()
            || new_status.operations.team_operations.len()
                != self.status.operations.team_operations.len()
            || new_status.operations.repository_team_operations.len()
                != self.status.operations.repository_team_operations.len();

        let mut changed = removed;
        if state == OperationState::Failed && !new_status.error.is_empty() {
            new_status.error.clear();
            changed = true;
        }
        if !changed {
            return None;
        }

        new_status.org_status = Some(new_status.recomputed_state());
        new_status.timestamp = Some(now);
        Some(new_status)
    }
}

/// Compute the repo-team operations for one visibility class.
///
/// For each repository the effective configuration is the defaults (unless
/// the repository is on the skip list) extended by matching overrides. A
/// missing team enqueues an add, a wrong permission a remove followed by an
/// add with the configured permission, a surplus team a remove. Operations
/// already tracked (anything but complete) are not re-enqueued, nor are
/// duplicates within one pass.
fn repo_team_operations(
    defaults: &[TeamWithPermission],
    actual: &[Repository],
    overrides: &[TeamRepository],
    skip: &[String],
    existing: &[RepoTeamOperation],
    now: DateTime<Utc>,
) -> Vec<RepoTeamOperation> {
    let mut new_ops: Vec<RepoTeamOperation> = Vec::new();

    let tracked = |new_ops: &[RepoTeamOperation], kind: OperationKind, repo: &str, team: &str| {
        existing
            .iter()
            .any(|op| op.matches(kind, repo, team) && op.state != OperationState::Complete)
            || new_ops.iter().any(|op| op.matches(kind, repo, team))
    };

    for repo in actual {
        let mut effective: Vec<TeamWithPermission> = if skip.contains(&repo.name) {
            Vec::new()
        } else {
            defaults.to_vec()
        };
        for exception in overrides {
            if exception.covers(&repo.name) {
                effective.push(TeamWithPermission::new(
                    exception.spec.team.clone(),
                    exception.spec.permission,
                ));
            }
        }

        for config_team in &effective {
            match repo.teams.iter().find(|t| t.team == config_team.team) {
                None => {
                    if !tracked(&new_ops, OperationKind::Add, &repo.name, &config_team.team) {
                        new_ops.push(RepoTeamOperation::pending_add(
                            &repo.name,
                            &config_team.team,
                            config_team.permission,
                            now,
                        ));
                    }
                }
                Some(observed) if observed.permission != config_team.permission => {
                    if !tracked(&new_ops, OperationKind::Remove, &repo.name, &config_team.team) {
                        new_ops.push(RepoTeamOperation::pending_remove(
                            &repo.name,
                            &config_team.team,
                            now,
                        ));
                    }
                    if !tracked(&new_ops, OperationKind::Add, &repo.name, &config_team.team) {
                        new_ops.push(RepoTeamOperation::pending_add(
                            &repo.name,
                            &config_team.team,
                            config_team.permission,
                            now,
                        ));
                    }
                }
                Some(_) => {}
            }
        }

        for observed in &repo.teams {
            let configured = effective.iter().any(|t| t.team == observed.team);
            if !configured
                && !tracked(&new_ops, OperationKind::Remove, &repo.name, &observed.team)
            {
                new_ops.push(RepoTeamOperation::pending_remove(
                    &repo.name,
                    &observed.team,
                    now,
                ));
            }
        }
    }

    new_ops
}
