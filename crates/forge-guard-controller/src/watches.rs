//! Watch map-funcs: which keys an upstream change re-enqueues.
//!
//! Cyclic Organization ↔ Team references are resolved by unidirectional
//! ownership in the store plus these notification edges; no in-memory
//! back-pointers exist.

use forge_guard_core::account_link::AccountLink;
use forge_guard_core::labels::{LABEL_ORPHANED, LABEL_REQUIRE_VERIFIED_DOMAIN_EMAIL};
use forge_guard_core::organization::Organization;
use forge_guard_core::team::Team;
use forge_guard_core::team_repository::TeamRepository;
use forge_guard_core::{ObjectKey, StoreObject};

/// Organizations listing the changed team as an owner team.
#[must_use]
pub fn organizations_for_owner_team(
    team: &Team,
    organizations: &[Organization],
) -> Vec<ObjectKey> {
    organizations
        .iter()
        .filter(|org| {
            org.spec
                .organization_owner_teams
                .iter()
                .any(|owner_team| *owner_team == team.spec.team)
        })
        .map(StoreObject::key)
        .collect()
}

/// Organizations covered by the changed override.
#[must_use]
pub fn organizations_for_team_repository(
    team_repository: &TeamRepository,
    organizations: &[Organization],
) -> Vec<ObjectKey> {
    organizations
        .iter()
        .filter(|org| {
            org.spec.forge == team_repository.spec.forge
                && org.spec.organization == team_repository.spec.organization
        })
        .map(StoreObject::key)
        .collect()
}

/// Teams sourcing their members from the changed sibling group team.
#[must_use]
pub fn teams_for_group_team(group_team_name: &str, teams: &[Team]) -> Vec<ObjectKey> {
    teams
        .iter()
        .filter(|team| team.spec.greenhouse_team.as_deref() == Some(group_team_name))
        .map(StoreObject::key)
        .collect()
}

/// Teams whose verified-domain requirement the changed link can affect:
/// same forge, and the label is present.
#[must_use]
pub fn teams_for_account_link(link: &AccountLink, teams: &[Team]) -> Vec<ObjectKey> {
    teams
        .iter()
        .filter(|team| {
            team.metadata
                .label(LABEL_REQUIRE_VERIFIED_DOMAIN_EMAIL)
                .map(|v| !v.is_empty())
                .unwrap_or(false)
                && team.spec.forge == link.spec.forge
        })
        .map(StoreObject::key)
        .collect()
}

/// Reconcile predicate on Team: orphaned objects are excluded.
#[must_use]
pub fn team_is_reconcilable(team: &Team) -> bool {
    !team.metadata.label_is_true(LABEL_ORPHANED)
}
