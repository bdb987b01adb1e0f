//! Team reconciler: aligns forge team membership with the member source.
//!
//! Per pass: honor a standing rate limit, apply TTL maintenance, validate
//! the resource spec, ensure the forge team exists, refresh observed members,
//! resolve desired members through the provider and the account links,
//! diff, then execute whatever operations are pending.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use forge_guard_core::labels::{
    ENABLED, LABEL_ADD_USER, LABEL_COMPLETED_TTL, LABEL_DISABLE_INTERNAL_USERNAMES,
    LABEL_DRY_RUN, LABEL_FAILED_TTL, LABEL_NOTFOUND_TTL, LABEL_ORPHANED, LABEL_REMOVE_USER,
    LABEL_REQUIRE_VERIFIED_DOMAIN_EMAIL, LABEL_SKIPPED_TTL,
};
use forge_guard_core::member::members_match;
use forge_guard_core::operations::{OperationKind, OperationState};
use forge_guard_core::organization_object_name;
use forge_guard_core::ratelimit::parse_rate_limit_reset;
use forge_guard_core::state::SyncState;
use forge_guard_core::team::{ProviderKind, Team, TeamStatus};
use forge_guard_core::ttl::{parse_ttl, ttl_expired};
use forge_guard_core::ObjectKey;
use forge_guard_forge::{ForgeApi, ForgeError};

use crate::context::Context;
use crate::error::{ControllerError, ControllerResult};
use crate::identity::{desired_members, observed_members, LinkMaps};
use crate::reconcile::ReconcileOutcome;

const TTL_CLEANUPS: [(&str, OperationState, bool); 4] = [
    (LABEL_FAILED_TTL, OperationState::Failed, true),
    (LABEL_COMPLETED_TTL, OperationState::Complete, false),
    (LABEL_NOTFOUND_TTL, OperationState::NotFound, false),
    (LABEL_SKIPPED_TTL, OperationState::Skipped, false),
];

pub struct TeamReconciler {
    ctx: Arc<Context>,
}

impl TeamReconciler {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> ControllerResult<ReconcileOutcome> {
        let Some(mut team) = self.ctx.stores.teams.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };
        if team.metadata.label_is_true(LABEL_ORPHANED) {
            return Ok(ReconcileOutcome::Done);
        }
        self.ctx.metrics.set_team_metrics(&team);

        // A standing rate limit is honored from the stored error.
        if team.status.team_status == Some(SyncState::RateLimited) && !team.status.error.is_empty()
        {
            let now = Utc::now();
            if let Some(reset) = parse_rate_limit_reset(&team.status.error, now) {
                if reset > now {
                    let wait = (reset - now).to_std().unwrap_or(Duration::ZERO);
                    return Ok(ReconcileOutcome::RequeueAfter(wait));
                }
                let mut status = team.status.clone();
                status.error.clear();
                status.team_status = Some(status.recomputed_state());
                status.timestamp = Some(now);
                team = self.write_status(key, status).await?;
            }
        }

        // TTL-driven cleanup of terminal operations.
        for (label, state, only_when_failed) in TTL_CLEANUPS {
            let Some(ttl) = team.metadata.label(label).filter(|v| !v.is_empty()) else {
                continue;
            };
            if only_when_failed && team.status.team_status != Some(SyncState::Failed) {
                continue;
            }
            let Some(since) = team.status.timestamp else {
                continue;
            };
            let now = Utc::now();
            match ttl_expired(ttl, since, now) {
                Ok(true) => {
                    if let Some(status) = team.clean_operations_in_state(state, now) {
                        info!(team = %key, label, "ttl expired, cleaning operations");
                        let team = self.write_status(key, status).await?;
                        self.ctx.metrics.set_team_metrics(&team);
                        return Ok(ReconcileOutcome::Done);
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(team = %key, label, error = %e, "invalid ttl label, skipping cleanup");
                }
            }
        }

        // Spec validation.
        if team.spec.forge.is_empty() {
            return self.fail(key, &team, "forge name not provided").await;
        }
        if team.spec.organization.is_empty() {
            return self.fail(key, &team, "organization name not provided").await;
        }
        if team.spec.team.is_empty() {
            return self.fail(key, &team, "team name not provided").await;
        }

        let forge_key = ObjectKey::new(key.namespace.clone(), team.spec.forge.clone());
        if self.ctx.stores.forges.get(&forge_key).await?.is_none() {
            return self.fail(key, &team, "forge not found").await;
        }
        let Some(client) = self.ctx.registries.forges.get(&team.spec.forge).await else {
            info!(team = %key, forge = %team.spec.forge, "waiting for forge client to be initialized");
            return Ok(ReconcileOutcome::RequeueAfter(self.ctx.config.registry_wait()));
        };

        let org_key = ObjectKey::new(
            key.namespace.clone(),
            organization_object_name(&team.spec.forge, &team.spec.organization),
        );
        let Some(organization) = self.ctx.stores.organizations.get(&org_key).await? else {
            return self
                .fail(key, &team, format!("organization not found: {org_key}"))
                .await;
        };
        let installation = organization.spec.installation_id;

        // Member source invariants: exactly zero or one of the two source
        // mechanisms, and at most one provider variant.
        if team.spec.greenhouse_team.is_some() && team.spec.external_member_provider.is_some() {
            return self
                .fail(key, &team, "both greenhouseTeam and externalMemberProvider are set")
                .await;
        }
        if team.spec.greenhouse_team.is_none() && team.spec.external_member_provider.is_none() {
            return self.orphan(key, team).await;
        }
        if let Some(emp) = &team.spec.external_member_provider {
            if emp.variants_set() > 1 {
                return self
                    .fail(
                        key,
                        &team,
                        "multiple external member providers are set; only one is allowed",
                    )
                    .await;
            }
        }

        // With no pending operations, re-observe and diff.
        if team.status.team_status != Some(SyncState::Pending) {
            let org_teams = match client.list_teams(installation, &team.spec.organization).await {
                Ok(teams) => teams,
                Err(e) => {
                    return self
                        .forge_failure(key, &team, "error during listing organization teams", e)
                        .await
                }
            };

            if !org_teams.iter().any(|t| *t == team.spec.team) {
                if team.metadata.label_is_true(LABEL_DRY_RUN) {
                    info!(team = %key, "team not found on forge, creation suppressed by dry run");
                    if team.status.team_status != Some(SyncState::DryRun) {
                        let mut status = team.status.clone();
                        status.set_state(SyncState::DryRun, "", Utc::now());
                        let team = self.write_status(key, status).await?;
                        self.ctx.metrics.set_team_metrics(&team);
                    }
                    return Ok(ReconcileOutcome::Done);
                }
                info!(team = %key, "team not found on forge, creating it");
                if let Err(e) = client
                    .create_team(installation, &team.spec.organization, &team.spec.team)
                    .await
                {
                    return self
                        .forge_failure(key, &team, "error during adding team to forge", e)
                        .await;
                }
                return Ok(ReconcileOutcome::Requeue);
            }

            let accounts = match client
                .team_members(installation, &team.spec.organization, &team.spec.team)
                .await
            {
                Ok(accounts) => accounts,
                Err(e) => {
                    return self
                        .forge_failure(key, &team, "error during getting team members", e)
                        .await
                }
            };

            let links = self.ctx.stores.account_links.list().await?;
            let maps = LinkMaps::build(&links, &team.spec.forge);
            let observed = observed_members(&maps, &accounts);

            if !members_match(&team.status.members, &observed) {
                info!(team = %key, "observed members changed, updating status");
                let mut status = team.status.clone();
                status.members = observed.clone();
                team = self.write_status(key, status).await?;
                // Continue in the same pass to compute operations.
            }

            let desired_ids = match self.resolve_desired_ids(key, &team).await? {
                DesiredIds::Resolved(ids) => ids,
                DesiredIds::Finished(outcome) => return Ok(outcome),
            };

            let required_domain = team
                .metadata
                .label(LABEL_REQUIRE_VERIFIED_DOMAIN_EMAIL)
                .filter(|v| !v.is_empty());
            let mut desired = desired_members(
                &client,
                installation,
                &maps,
                &desired_ids,
                required_domain,
                &team.spec.organization,
            )
            .await?;

            if team.metadata.label_is_true(LABEL_DISABLE_INTERNAL_USERNAMES) {
                desired.retain(|m| {
                    let keep = m.id != m.login;
                    if !keep {
                        info!(team = %key, member = %m.login, "member filtered: internal usernames are disabled");
                    }
                    keep
                });
            }

            let now = Utc::now();
            if let Some(mut status) = team.change_calculator(&desired, now) {
                // Surface the intended membership immediately; operations
                // track the work still to be done.
                status.members = desired;
                let team = self.write_status(key, status).await?;
                self.ctx.metrics.set_team_metrics(&team);
                return Ok(ReconcileOutcome::Done);
            }
            if team.status.team_status.is_none() {
                let mut status = team.status.clone();
                status.set_state(SyncState::Complete, "", now);
                team = self.write_status(key, status).await?;
            }
        }

        // Dry-run transitions.
        if team.metadata.label_is_true(LABEL_DRY_RUN) {
            if team.status.team_status != Some(SyncState::DryRun) {
                info!(team = %key, "switching to dry run mode");
                let mut status = team.status.clone();
                status.set_state(SyncState::DryRun, "", Utc::now());
                let team = self.write_status(key, status).await?;
                self.ctx.metrics.set_team_metrics(&team);
                return Ok(ReconcileOutcome::Requeue);
            }
        } else if team.status.team_status == Some(SyncState::DryRun) {
            let mut status = team.status.clone();
            let recomputed = status.recomputed_state();
            info!(team = %key, state = %recomputed, "switching from dry run mode");
            status.set_state(recomputed, "", Utc::now());
            let team = self.write_status(key, status).await?;
            self.ctx.metrics.set_team_metrics(&team);
            return Ok(ReconcileOutcome::Requeue);
        }
        if team.status.team_status == Some(SyncState::DryRun) {
            return Ok(ReconcileOutcome::Done);
        }

        // Execute pending operations.
        if team.status.team_status == Some(SyncState::Pending) {
            let team = self.execute_operations(key, team, &client, installation).await?;
            self.ctx.metrics.set_team_metrics(&team);
        }

        Ok(ReconcileOutcome::Done)
    }

    /// Resolve the desired member ids from the configured source.
    async fn resolve_desired_ids(
        &self,
        key: &ObjectKey,
        team: &Team,
    ) -> ControllerResult<DesiredIds> {
        if let Some(group_team_name) = &team.spec.greenhouse_team {
            let group_key = ObjectKey::new(key.namespace.clone(), group_team_name.clone());
            let Some(group_team) = self.ctx.stores.group_teams.get(&group_key).await? else {
                info!(team = %key, group_team = %group_team_name, "group team not found, labeling orphaned");
                let outcome = self.orphan(key, team.clone()).await?;
                return Ok(DesiredIds::Finished(outcome));
            };
            return Ok(DesiredIds::Resolved(group_team.member_ids()));
        }

        let Some(emp) = &team.spec.external_member_provider else {
            // Unreachable after spec validation; treated as an empty source.
            return Ok(DesiredIds::Resolved(Vec::new()));
        };
        let Some((kind, provider_ref)) = emp.selected() else {
            return Ok(DesiredIds::Resolved(Vec::new()));
        };

        let provider_key = ObjectKey::new(key.namespace.clone(), provider_ref.provider.clone());
        let registry = match kind {
            ProviderKind::Directory => {
                if self
                    .ctx
                    .stores
                    .directory_providers
                    .get(&provider_key)
                    .await?
                    .is_none()
                {
                    let outcome = self
                        .fail(key, team, format!("provider not found: {provider_key}"))
                        .await?;
                    return Ok(DesiredIds::Finished(outcome));
                }
                &self.ctx.registries.directory_providers
            }
            ProviderKind::Http => {
                if self
                    .ctx
                    .stores
                    .http_providers
                    .get(&provider_key)
                    .await?
                    .is_none()
                {
                    let outcome = self
                        .fail(key, team, format!("provider not found: {provider_key}"))
                        .await?;
                    return Ok(DesiredIds::Finished(outcome));
                }
                &self.ctx.registries.http_providers
            }
            ProviderKind::Static => &self.ctx.registries.static_providers,
        };

        let Some(source) = registry.get(&provider_ref.provider).await else {
            info!(team = %key, provider = %provider_ref.provider, "waiting for member provider to be initialized");
            return Ok(DesiredIds::Finished(ReconcileOutcome::RequeueAfter(
                self.ctx.config.registry_wait(),
            )));
        };

        match source.users(&provider_ref.group).await {
            Ok(ids) => Ok(DesiredIds::Resolved(ids)),
            Err(e) => {
                warn!(team = %key, provider = %provider_ref.provider, error = %e, "member provider lookup failed");
                let outcome = self
                    .fail(
                        key,
                        team,
                        format!("error during getting users from {kind} provider: {e}"),
                    )
                    .await?;
                Ok(DesiredIds::Finished(outcome))
            }
        }
    }

    /// Run every pending operation against the forge and persist the
    /// resulting status.
    async fn execute_operations(
        &self,
        key: &ObjectKey,
        team: Team,
        client: &Arc<dyn ForgeApi>,
        installation: i64,
    ) -> ControllerResult<Team> {
        let mut status = team.status.clone();
        let mut changed = false;

        let add_gate_closed = matches!(
            team.metadata.label(LABEL_ADD_USER),
            Some(value) if !value.is_empty() && value != ENABLED
        );
        let remove_gate_closed = matches!(
            team.metadata.label(LABEL_REMOVE_USER),
            Some(value) if !value.is_empty() && value != ENABLED
        );

        for op in &mut status.operations {
            if op.state != OperationState::Pending {
                continue;
            }
            let now = Utc::now();
            match op.operation {
                OperationKind::Add => {
                    if add_gate_closed {
                        info!(team = %key, user = %op.user, "adding users is not enabled, operation skipped");
                        op.finish(OperationState::Skipped, None, now);
                        changed = true;
                        continue;
                    }
                    match client
                        .add_team_member(installation, &team.spec.organization, &team.spec.team, &op.user)
                        .await
                    {
                        Ok(()) => {
                            info!(team = %key, user = %op.user, "user added to team");
                            op.finish(OperationState::Complete, None, now);
                        }
                        Err(ForgeError::MemberNotFound) => {
                            info!(team = %key, user = %op.user, "user not found on forge, marking operation notfound");
                            op.finish(
                                OperationState::NotFound,
                                Some("user not found on forge".to_string()),
                                now,
                            );
                        }
                        Err(e) => {
                            warn!(team = %key, user = %op.user, error = %e, "adding user to team failed");
                            op.finish(OperationState::Failed, Some(e.to_string()), now);
                        }
                    }
                    changed = true;
                }
                OperationKind::Remove => {
                    if remove_gate_closed {
                        info!(team = %key, user = %op.user, "removing users is not enabled, operation skipped");
                        op.finish(OperationState::Skipped, None, now);
                        changed = true;
                        continue;
                    }
                    match client
                        .remove_team_member(installation, &team.spec.organization, &team.spec.team, &op.user)
                        .await
                    {
                        Ok(()) => {
                            info!(team = %key, user = %op.user, "user removed from team");
                            op.finish(OperationState::Complete, None, now);
                        }
                        Err(e) => {
                            warn!(team = %key, user = %op.user, error = %e, "removing user from team failed");
                            op.finish(OperationState::Failed, Some(e.to_string()), now);
                        }
                    }
                    changed = true;
                }
            }
        }

        if !changed {
            return Ok(team);
        }

        status.team_status = Some(status.recomputed_state());
        status.timestamp = Some(Utc::now());
        info!(team = %key, state = ?status.team_status, "operation execution finished");
        self.write_status(key, status).await
    }

    /// Re-read the object and persist `status` against the fresh version.
    async fn write_status(&self, key: &ObjectKey, status: TeamStatus) -> ControllerResult<Team> {
        let Some(mut current) = self.ctx.stores.teams.get(key).await? else {
            return Err(ControllerError::Internal(format!(
                "team {key} disappeared during reconcile"
            )));
        };
        current.status = status;
        Ok(self.ctx.stores.teams.update_status(current).await?)
    }

    /// Record a failed status; requeue after the shortest TTL so the
    /// cleanup runs even without further events.
    async fn fail(
        &self,
        key: &ObjectKey,
        team: &Team,
        error: impl Into<String>,
    ) -> ControllerResult<ReconcileOutcome> {
        let error = error.into();
        info!(team = %key, error = %error, "team reconcile failed");
        let mut status = team.status.clone();
        status.set_state(SyncState::Failed, error, Utc::now());
        let team = self.write_status(key, status).await?;
        self.ctx.metrics.set_team_metrics(&team);
        match min_ttl(&team) {
            Some(wait) => Ok(ReconcileOutcome::RequeueAfter(wait)),
            None => Ok(ReconcileOutcome::Done),
        }
    }

    /// Record a forge call failure, honoring a rate limit when the error
    /// carries one.
    async fn forge_failure(
        &self,
        key: &ObjectKey,
        team: &Team,
        context: &str,
        error: ForgeError,
    ) -> ControllerResult<ReconcileOutcome> {
        let now = Utc::now();
        let rendered = error.to_string();
        if let Some(reset) = parse_rate_limit_reset(&rendered, now) {
            warn!(team = %key, error = %rendered, "forge rate limit hit");
            let mut status = team.status.clone();
            status.set_state(SyncState::RateLimited, format!("{context}: {rendered}"), now);
            let team = self.write_status(key, status).await?;
            self.ctx.metrics.set_team_metrics(&team);
            let wait = (reset - now).to_std().unwrap_or(Duration::ZERO);
            return Ok(ReconcileOutcome::RequeueAfter(wait));
        }
        Err(error.into())
    }

    /// Label the team orphaned; the reconcile predicate excludes it from
    /// further passes until an operator intervenes.
    async fn orphan(&self, key: &ObjectKey, mut team: Team) -> ControllerResult<ReconcileOutcome> {
        info!(team = %key, "team has no member source, labeling orphaned");
        team.metadata
            .labels
            .insert(LABEL_ORPHANED.to_string(), "true".to_string());
        self.ctx.stores.teams.update(team).await?;
        Ok(ReconcileOutcome::Done)
    }
}

enum DesiredIds {
    Resolved(Vec<String>),
    Finished(ReconcileOutcome),
}

/// Shortest TTL configured on the team, if any.
fn min_ttl(team: &Team) -> Option<Duration> {
    let mut min: Option<Duration> = None;
    for (label, _, _) in TTL_CLEANUPS {
        let Some(value) = team.metadata.label(label).filter(|v| !v.is_empty()) else {
            continue;
        };
        let Ok(ttl) = parse_ttl(value) else { continue };
        let Ok(ttl) = ttl.to_std() else { continue };
        min = Some(match min {
            Some(current) if current <= ttl => current,
            _ => ttl,
        });
    }
    min
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_guard_core::ObjectMeta;

    #[test]
    fn test_min_ttl_picks_shortest() {
        let mut team = Team {
            metadata: ObjectMeta::named("t"),
            ..Team::default()
        };
        assert_eq!(min_ttl(&team), None);

        team.metadata
            .labels
            .insert(LABEL_FAILED_TTL.to_string(), "1h".to_string());
        team.metadata
            .labels
            .insert(LABEL_COMPLETED_TTL.to_string(), "30m".to_string());
        team.metadata
            .labels
            .insert(LABEL_SKIPPED_TTL.to_string(), "bogus".to_string());
        assert_eq!(min_ttl(&team), Some(Duration::from_secs(1800)));
    }
}
