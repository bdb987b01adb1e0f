//! Organization reconciler: aligns owners, the team roster and per-repo
//! team permissions with the desired state.
//!
//! Owners are the union of the referenced owner teams' resolved members;
//! the team roster is the set of Team records for this organization; repo
//! permissions follow the visibility defaults plus the TeamRepository
//! overrides. Repository lists are fetched fresh each pass and never
//! persisted.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use forge_guard_core::labels::{
    CLEAN_OPERATIONS_COMPLETE, CLEAN_OPERATIONS_FAILED, ENABLED, LABEL_ADD_ORGANIZATION_OWNER,
    LABEL_ADD_REPOSITORY_TEAM, LABEL_ADD_TEAM, LABEL_CLEAN_OPERATIONS, LABEL_COMPLETED_TTL,
    LABEL_DRY_RUN, LABEL_FAILED_TTL, LABEL_REMOVE_ORGANIZATION_OWNER,
    LABEL_REMOVE_REPOSITORY_TEAM, LABEL_REMOVE_TEAM,
};
use forge_guard_core::member::{members_match, names_match, Member};
use forge_guard_core::operations::{OperationKind, OperationState};
use forge_guard_core::organization::{Organization, OrganizationStatus};
use forge_guard_core::ratelimit::parse_rate_limit_reset;
use forge_guard_core::state::SyncState;
use forge_guard_core::team_object_name;
use forge_guard_core::ttl::ttl_expired;
use forge_guard_core::ObjectKey;
use forge_guard_forge::{ForgeApi, ForgeError};

use crate::context::Context;
use crate::error::{ControllerError, ControllerResult};
use crate::identity::{observed_members, LinkMaps};
use crate::reconcile::ReconcileOutcome;

pub struct OrganizationReconciler {
    ctx: Arc<Context>,
}

enum OwnerAggregation {
    Ready(Vec<Member>),
    NotReady,
    TeamFailed(String),
}

impl OrganizationReconciler {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> ControllerResult<ReconcileOutcome> {
        let Some(mut org) = self.ctx.stores.organizations.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };
        self.ctx.metrics.set_organization_metrics(&org);

        // A standing rate limit is honored from the stored error.
        if org.status.org_status == Some(SyncState::RateLimited) && !org.status.error.is_empty() {
            let now = Utc::now();
            if let Some(reset) = parse_rate_limit_reset(&org.status.error, now) {
                if reset > now {
                    let wait = (reset - now).to_std().unwrap_or(Duration::ZERO);
                    return Ok(ReconcileOutcome::RequeueAfter(wait));
                }
                let mut status = org.status.clone();
                status.error.clear();
                status.org_status = Some(status.recomputed_state());
                status.timestamp = Some(now);
                org = self.write_status(key, status).await?;
                self.ctx.metrics.set_organization_metrics(&org);
            }
        }

        // TTL-driven cleanup across the three operation queues.
        for (label, state, only_when_failed) in [
            (LABEL_FAILED_TTL, OperationState::Failed, true),
            (LABEL_COMPLETED_TTL, OperationState::Complete, false),
        ] {
            let Some(ttl) = org.metadata.label(label).filter(|v| !v.is_empty()) else {
                continue;
            };
            if only_when_failed && org.status.org_status != Some(SyncState::Failed) {
                continue;
            }
            let Some(since) = org.status.timestamp else {
                continue;
            };
            let now = Utc::now();
            match ttl_expired(ttl, since, now) {
                Ok(true) => {
                    if let Some(status) = org.clean_operations_in_state(state, now) {
                        info!(organization = %key, label, "ttl expired, cleaning operations");
                        let org = self.write_status(key, status).await?;
                        self.ctx.metrics.set_organization_metrics(&org);
                        return Ok(ReconcileOutcome::Done);
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(organization = %key, label, error = %e, "invalid ttl label, skipping cleanup");
                }
            }
        }

        // Spec validation.
        if org.spec.forge.is_empty() {
            return self.fail(key, &org, "forge name not provided").await;
        }
        if org.spec.organization.is_empty() {
            return self.fail(key, &org, "organization name not provided").await;
        }
        let forge_key = ObjectKey::new(key.namespace.clone(), org.spec.forge.clone());
        if self.ctx.stores.forges.get(&forge_key).await?.is_none() {
            return self.fail(key, &org, "forge not found").await;
        }
        let Some(client) = self.ctx.registries.forges.get(&org.spec.forge).await else {
            info!(organization = %key, forge = %org.spec.forge, "waiting for forge client to be initialized");
            return Ok(ReconcileOutcome::RequeueAfter(self.ctx.config.registry_wait()));
        };
        let installation = org.spec.installation_id;

        // With no pending operations, re-observe and diff.
        if org.status.org_status != Some(SyncState::Pending) {
            let owner_accounts = match client
                .organization_owners(installation, &org.spec.organization)
                .await
            {
                Ok(owners) => owners,
                Err(e) => {
                    return self
                        .forge_failure(key, &org, "error in getting organization owners", e)
                        .await
                }
            };
            let forge_teams = match client.list_teams(installation, &org.spec.organization).await {
                Ok(teams) => teams,
                Err(e) => {
                    return self
                        .forge_failure(key, &org, "error in getting teams", e)
                        .await
                }
            };
            let listing = match client
                .list_repositories(installation, &org.spec.organization)
                .await
            {
                Ok(listing) => listing,
                Err(e) => {
                    return self
                        .forge_failure(key, &org, "error in getting repositories", e)
                        .await
                }
            };

            let links = self.ctx.stores.account_links.list().await?;
            let maps = LinkMaps::build(&links, &org.spec.forge);
            let observed_owners = observed_members(&maps, &owner_accounts);

            // Keep the persisted status compact and current.
            let mut update_required = false;
            let mut status = org.status.clone();
            if !status.public_repositories.is_empty() || !status.private_repositories.is_empty() {
                status.clear_repository_lists();
                update_required = true;
            }
            if !members_match(&status.organization_owners, &observed_owners) {
                info!(organization = %key, "organization owner list will be updated");
                status.organization_owners = observed_owners;
                update_required = true;
            }
            if !names_match(&status.teams, &forge_teams) {
                info!(organization = %key, "teams list will be updated");
                status.teams = forge_teams;
                update_required = true;
            }
            if update_required {
                let org = self.write_status(key, status).await?;
                self.ctx.metrics.set_organization_metrics(&org);
                return Ok(ReconcileOutcome::Done);
            }

            // Owner diff.
            let owner_sync_enabled = !(org.metadata.label(LABEL_ADD_ORGANIZATION_OWNER)
                == Some("false")
                && org.metadata.label(LABEL_REMOVE_ORGANIZATION_OWNER) == Some("false"));
            if owner_sync_enabled {
                match self.aggregate_owner_teams(key, &org).await? {
                    OwnerAggregation::NotReady => {
                        info!(organization = %key, "owner teams not ready, retrying later");
                        return Ok(ReconcileOutcome::RequeueAfter(self.ctx.config.owner_settle()));
                    }
                    OwnerAggregation::TeamFailed(error) => {
                        return self
                            .fail(key, &org, format!("error in getting owners: {error}"))
                            .await;
                    }
                    OwnerAggregation::Ready(desired) if desired.is_empty() => {
                        info!(organization = %key, "no desired owners resolved yet, retrying later");
                        return Ok(ReconcileOutcome::RequeueAfter(self.ctx.config.owner_settle()));
                    }
                    OwnerAggregation::Ready(desired) => {
                        if let Some(status) = org.owner_change_calculator(&desired, Utc::now()) {
                            info!(organization = %key, "owner change calculation updated the status");
                            let org = self.write_status(key, status).await?;
                            self.ctx.metrics.set_organization_metrics(&org);
                            return Ok(ReconcileOutcome::Done);
                        }
                    }
                }
            }

            // Team diff.
            let team_sync_enabled = !(org.metadata.label(LABEL_ADD_TEAM) == Some("false")
                && org.metadata.label(LABEL_REMOVE_TEAM) == Some("false"));
            if team_sync_enabled {
                let desired_teams = self.desired_teams(&org).await?;
                if let Some(status) = org.team_change_calculator(&desired_teams, Utc::now()) {
                    info!(organization = %key, "team change calculation updated the status");
                    let org = self.write_status(key, status).await?;
                    self.ctx.metrics.set_organization_metrics(&org);
                    return Ok(ReconcileOutcome::Done);
                }
            }

            // Repo diff, against the freshly fetched lists, without ever
            // persisting them.
            let repo_sync_enabled = !(org.metadata.label(LABEL_ADD_REPOSITORY_TEAM)
                == Some("false")
                && org.metadata.label(LABEL_REMOVE_REPOSITORY_TEAM) == Some("false"));
            if repo_sync_enabled {
                let overrides = self.overrides_for(&org).await?;
                let mut staged = org.clone();
                staged.status.public_repositories = listing.public;
                staged.status.private_repositories = listing.private;
                if let Some(mut status) = staged.repo_change_calculator(&overrides, Utc::now()) {
                    info!(organization = %key, "repository change calculation updated the status");
                    status.out_of_policy_repositories = status.out_of_policy_from_operations();
                    status.clear_repository_lists();
                    let org = self.write_status(key, status).await?;
                    self.ctx.metrics.set_organization_metrics(&org);
                    return Ok(ReconcileOutcome::Done);
                }
            }

            // First pass with nothing to do.
            if org.status.org_status.is_none() {
                let mut status = org.status.clone();
                status.set_state(SyncState::Complete, "", Utc::now());
                org = self.write_status(key, status).await?;
            }
        }

        // Dry-run transitions.
        if org.metadata.label_is_true(LABEL_DRY_RUN) {
            if org.status.org_status != Some(SyncState::DryRun) {
                info!(organization = %key, "switching to dry run mode");
                let mut status = org.status.clone();
                status.set_state(SyncState::DryRun, "", Utc::now());
                let org = self.write_status(key, status).await?;
                self.ctx.metrics.set_organization_metrics(&org);
                return Ok(ReconcileOutcome::Requeue);
            }
        } else if org.status.org_status == Some(SyncState::DryRun) {
            let mut status = org.status.clone();
            let recomputed = status.recomputed_state();
            info!(organization = %key, state = %recomputed, "switching from dry run mode");
            status.set_state(recomputed, "", Utc::now());
            let org = self.write_status(key, status).await?;
            self.ctx.metrics.set_organization_metrics(&org);
            return Ok(ReconcileOutcome::Requeue);
        }

        if org.status.org_status == Some(SyncState::DryRun) {
            return self.clean_operations_in_dry_run(key, org).await;
        }

        // Execute pending operations.
        if org.status.org_status == Some(SyncState::Pending) {
            return self.execute_operations(key, org, &client, installation).await;
        }

        Ok(ReconcileOutcome::Done)
    }

    /// Union of resolved members across the configured owner teams.
    async fn aggregate_owner_teams(
        &self,
        key: &ObjectKey,
        org: &Organization,
    ) -> ControllerResult<OwnerAggregation> {
        let mut owners: BTreeMap<String, Member> = BTreeMap::new();
        for team_name in &org.spec.organization_owner_teams {
            let team_key = ObjectKey::new(
                key.namespace.clone(),
                team_object_name(&org.spec.forge, &org.spec.organization, team_name),
            );
            let Some(team) = self.ctx.stores.teams.get(&team_key).await? else {
                return Ok(OwnerAggregation::NotReady);
            };
            match team.status.team_status {
                Some(SyncState::Pending) | None => return Ok(OwnerAggregation::NotReady),
                Some(SyncState::RateLimited) => return Ok(OwnerAggregation::NotReady),
                Some(SyncState::Failed) => {
                    return Ok(OwnerAggregation::TeamFailed(format!(
                        "team {team_name} state is failed, cannot sync organization owners"
                    )));
                }
                Some(SyncState::Complete) | Some(SyncState::DryRun) => {
                    for member in &team.status.members {
                        owners.insert(member.id.clone(), member.clone());
                    }
                }
            }
        }
        Ok(OwnerAggregation::Ready(owners.into_values().collect()))
    }

    /// Team names of every Team record belonging to this organization.
    async fn desired_teams(&self, org: &Organization) -> ControllerResult<Vec<String>> {
        let teams = self.ctx.stores.teams.list().await?;
        Ok(teams
            .into_iter()
            .filter(|t| {
                t.spec.forge == org.spec.forge && t.spec.organization == org.spec.organization
            })
            .map(|t| t.spec.team)
            .collect())
    }

    /// TeamRepository overrides for this `(forge, organization)`.
    async fn overrides_for(
        &self,
        org: &Organization,
    ) -> ControllerResult<Vec<forge_guard_core::team_repository::TeamRepository>> {
        let overrides = self.ctx.stores.team_repositories.list().await?;
        Ok(overrides
            .into_iter()
            .filter(|tr| {
                tr.spec.forge == org.spec.forge && tr.spec.organization == org.spec.organization
            })
            .collect())
    }

    /// Honor the cleanOperations label while in dry-run.
    async fn clean_operations_in_dry_run(
        &self,
        key: &ObjectKey,
        org: Organization,
    ) -> ControllerResult<ReconcileOutcome> {
        let Some(target) = org.metadata.label(LABEL_CLEAN_OPERATIONS) else {
            return Ok(ReconcileOutcome::Done);
        };
        let state = match target {
            CLEAN_OPERATIONS_COMPLETE => OperationState::Complete,
            CLEAN_OPERATIONS_FAILED => OperationState::Failed,
            _ => return Ok(ReconcileOutcome::Done),
        };

        if let Some(mut status) = org.clean_operations_in_state(state, Utc::now()) {
            info!(organization = %key, target, "cleaning operations");
            // Keep dry-run in force while the label stays.
            status.org_status = Some(SyncState::DryRun);
            let org = self.write_status(key, status).await?;
            self.ctx.metrics.set_organization_metrics(&org);
            return Ok(ReconcileOutcome::Done);
        }

        // Nothing left to clean: drop the label.
        info!(organization = %key, "clean operations label will be removed");
        let Some(mut current) = self.ctx.stores.organizations.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };
        current.metadata.labels.remove(LABEL_CLEAN_OPERATIONS);
        self.ctx.stores.organizations.update(current).await?;
        Ok(ReconcileOutcome::Done)
    }

    /// Run every pending operation across the three queues.
    async fn execute_operations(
        &self,
        key: &ObjectKey,
        org: Organization,
        client: &Arc<dyn ForgeApi>,
        installation: i64,
    ) -> ControllerResult<ReconcileOutcome> {
        let mut status = org.status.clone();
        let mut changed = false;
        let mut owner_change_applied = false;

        let gate_open = |label: &str| org.metadata.label(label) == Some(ENABLED);

        for op in &mut status.operations.owner_operations {
            if op.state != OperationState::Pending {
                continue;
            }
            let now = Utc::now();
            match op.operation {
                OperationKind::Add => {
                    if !gate_open(LABEL_ADD_ORGANIZATION_OWNER) {
                        info!(organization = %key, user = %op.user, "adding organization owners is not enabled, operation skipped");
                        op.finish(OperationState::Skipped, None, now);
                    } else {
                        match client
                            .promote_to_owner(installation, &org.spec.organization, &op.user)
                            .await
                        {
                            Ok(()) => {
                                info!(organization = %key, user = %op.user, "organization owner added");
                                op.finish(OperationState::Complete, None, now);
                                owner_change_applied = true;
                            }
                            Err(e) => {
                                warn!(organization = %key, user = %op.user, error = %e, "adding organization owner failed");
                                op.finish(OperationState::Failed, Some(e.to_string()), now);
                            }
                        }
                    }
                    changed = true;
                }
                OperationKind::Remove => {
                    if !gate_open(LABEL_REMOVE_ORGANIZATION_OWNER) {
                        info!(organization = %key, user = %op.user, "removing organization owners is not enabled, operation skipped");
                        op.finish(OperationState::Skipped, None, now);
                    } else {
                        match client
                            .demote_to_member(installation, &org.spec.organization, &op.user)
                            .await
                        {
                            Ok(()) => {
                                info!(organization = %key, user = %op.user, "organization owner removed");
                                op.finish(OperationState::Complete, None, now);
                                owner_change_applied = true;
                            }
                            Err(e) if is_last_admin_error(&e) => {
                                info!(organization = %key, user = %op.user, "last admin cannot be demoted, operation skipped");
                                op.finish(OperationState::Skipped, Some(e.to_string()), now);
                            }
                            Err(e) => {
                                warn!(organization = %key, user = %op.user, error = %e, "removing organization owner failed");
                                op.finish(OperationState::Failed, Some(e.to_string()), now);
                            }
                        }
                    }
                    changed = true;
                }
            }
        }

        for op in &mut status.operations.team_operations {
            if op.state != OperationState::Pending {
                continue;
            }
            let now = Utc::now();
            match op.operation {
                OperationKind::Add => {
                    if !gate_open(LABEL_ADD_TEAM) {
                        info!(organization = %key, team = %op.team, "adding teams is not enabled, operation skipped");
                        op.finish(OperationState::Skipped, None, now);
                    } else {
                        match client
                            .create_team(installation, &org.spec.organization, &op.team)
                            .await
                        {
                            Ok(()) => {
                                info!(organization = %key, team = %op.team, "team added");
                                op.finish(OperationState::Complete, None, now);
                            }
                            Err(e) => {
                                warn!(organization = %key, team = %op.team, error = %e, "adding team failed");
                                op.finish(OperationState::Failed, Some(e.to_string()), now);
                            }
                        }
                    }
                    changed = true;
                }
                OperationKind::Remove => {
                    if !gate_open(LABEL_REMOVE_TEAM) {
                        info!(organization = %key, team = %op.team, "removing teams is not enabled, operation skipped");
                        op.finish(OperationState::Skipped, None, now);
                    } else {
                        match client
                            .delete_team(installation, &org.spec.organization, &op.team)
                            .await
                        {
                            Ok(()) => {
                                info!(organization = %key, team = %op.team, "team removed");
                                op.finish(OperationState::Complete, None, now);
                            }
                            Err(e) => {
                                warn!(organization = %key, team = %op.team, error = %e, "removing team failed");
                                op.finish(OperationState::Failed, Some(e.to_string()), now);
                            }
                        }
                    }
                    changed = true;
                }
            }
        }

        for op in &mut status.operations.repository_team_operations {
            if op.state != OperationState::Pending {
                continue;
            }
            let now = Utc::now();
            match op.operation {
                OperationKind::Add => {
                    if !gate_open(LABEL_ADD_REPOSITORY_TEAM) {
                        info!(organization = %key, repo = %op.repo, team = %op.team, "adding repository teams is not enabled, operation skipped");
                        op.finish(OperationState::Skipped, None, now);
                        changed = true;
                        continue;
                    }
                    let Some(permission) = op.permission else {
                        op.finish(
                            OperationState::Failed,
                            Some("add operation carries no permission".to_string()),
                            now,
                        );
                        changed = true;
                        continue;
                    };
                    match client
                        .add_repository_team(
                            installation,
                            &org.spec.organization,
                            &op.repo,
                            &op.team,
                            permission,
                        )
                        .await
                    {
                        Ok(()) => {
                            info!(organization = %key, repo = %op.repo, team = %op.team, permission = %permission, "repository team added");
                            op.finish(OperationState::Complete, None, now);
                        }
                        Err(e) => {
                            warn!(organization = %key, repo = %op.repo, team = %op.team, error = %e, "adding repository team failed");
                            op.finish(OperationState::Failed, Some(e.to_string()), now);
                        }
                    }
                    changed = true;
                }
                OperationKind::Remove => {
                    if !gate_open(LABEL_REMOVE_REPOSITORY_TEAM) {
                        info!(organization = %key, repo = %op.repo, team = %op.team, "removing repository teams is not enabled, operation skipped");
                        op.finish(OperationState::Skipped, None, now);
                        changed = true;
                        continue;
                    }
                    match client
                        .remove_repository_team(
                            installation,
                            &org.spec.organization,
                            &op.repo,
                            &op.team,
                        )
                        .await
                    {
                        Ok(()) => {
                            info!(organization = %key, repo = %op.repo, team = %op.team, "repository team removed");
                            op.finish(OperationState::Complete, None, now);
                        }
                        Err(e) => {
                            warn!(organization = %key, repo = %op.repo, team = %op.team, error = %e, "removing repository team failed");
                            op.finish(OperationState::Failed, Some(e.to_string()), now);
                        }
                    }
                    changed = true;
                }
            }
        }

        if !changed {
            return Ok(ReconcileOutcome::Done);
        }

        let recomputed = status.recomputed_state();
        let failed = recomputed == SyncState::Failed;
        if !failed {
            status.error.clear();
        }
        status.out_of_policy_repositories = status.out_of_policy_from_operations();
        status.org_status = Some(recomputed);
        status.timestamp = Some(Utc::now());
        info!(organization = %key, state = %recomputed, "operation execution finished");

        let org = self.write_status(key, status).await?;
        self.ctx.metrics.set_organization_metrics(&org);

        // Give the forge time to reflect an owner change before the next
        // diff would otherwise re-detect it.
        if owner_change_applied && !failed {
            return Ok(ReconcileOutcome::RequeueAfter(self.ctx.config.owner_settle()));
        }
        Ok(ReconcileOutcome::Done)
    }

    /// Re-read the object and persist `status` against the fresh version,
    /// never letting repository lists leak into the store.
    async fn write_status(
        &self,
        key: &ObjectKey,
        mut status: OrganizationStatus,
    ) -> ControllerResult<Organization> {
        status.clear_repository_lists();
        let Some(mut current) = self.ctx.stores.organizations.get(key).await? else {
            return Err(ControllerError::Internal(format!(
                "organization {key} disappeared during reconcile"
            )));
        };
        current.status = status;
        Ok(self.ctx.stores.organizations.update_status(current).await?)
    }

    async fn fail(
        &self,
        key: &ObjectKey,
        org: &Organization,
        error: impl Into<String>,
    ) -> ControllerResult<ReconcileOutcome> {
        let error = error.into();
        info!(organization = %key, error = %error, "organization reconcile failed");
        let mut status = org.status.clone();
        status.set_state(SyncState::Failed, error, Utc::now());
        let org = self.write_status(key, status).await?;
        self.ctx.metrics.set_organization_metrics(&org);
        Ok(ReconcileOutcome::Done)
    }

    async fn forge_failure(
        &self,
        key: &ObjectKey,
        org: &Organization,
        context: &str,
        error: ForgeError,
    ) -> ControllerResult<ReconcileOutcome> {
        let now = Utc::now();
        let rendered = error.to_string();
        if let Some(reset) = parse_rate_limit_reset(&rendered, now) {
            warn!(organization = %key, error = %rendered, "forge rate limit hit");
            let mut status = org.status.clone();
            status.set_state(SyncState::RateLimited, format!("{context}: {rendered}"), now);
            let org = self.write_status(key, status).await?;
            self.ctx.metrics.set_organization_metrics(&org);
            let wait = (reset - now).to_std().unwrap_or(Duration::ZERO);
            return Ok(ReconcileOutcome::RequeueAfter(wait));
        }
        self.fail(key, org, format!("{context}: {rendered}")).await
    }
}

/// Whether the demotion error is the forge refusing to demote the last
/// admin; treated as skipped, not failed.
fn is_last_admin_error(error: &ForgeError) -> bool {
    error.to_string().to_lowercase().contains("last admin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_admin_detection() {
        let err = ForgeError::api(403, "You can't demote the last admin to a member.");
        assert!(is_last_admin_error(&err));
        let err = ForgeError::api(500, "internal error");
        assert!(!is_last_admin_error(&err));
    }
}
