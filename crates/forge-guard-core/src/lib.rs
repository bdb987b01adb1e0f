//! # forge-guard core model
//!
//! Resource types and pure reconciliation logic for the forge-guard
//! controller: the desired-state records kept in the coordination store,
//! the operation state machines embedded in their statuses, and the
//! change calculators that diff observed against desired state.
//!
//! Everything in this crate is side-effect free. Clocks are passed in so
//! that the calculators stay functions of their inputs; network and store
//! access live in the sibling crates.
//!
//! ## Crate organization
//!
//! - [`metadata`] - Object metadata (name, namespace, labels, annotations)
//! - [`member`] - Internal-id / forge-login identity pair
//! - [`operations`] - Operation kinds, states and queue entries
//! - [`forge`] - Forge (API endpoint + app credentials) resource
//! - [`organization`] - Organization resource and its change calculators
//! - [`team`] - Team resource and its change calculator
//! - [`team_repository`] - Per-repository permission overrides
//! - [`account_link`] - Identity link records and email-check annotations
//! - [`group_team`] - Sibling group-system team record
//! - [`provider`] - External member provider resources
//! - [`state`] - Aggregate sync state shared by Team and Organization
//! - [`labels`] - The behavioral label and annotation surface
//! - [`ratelimit`] - Forge rate-limit reset parsing
//! - [`ttl`] - Duration-label parsing for status cleanup

pub mod account_link;
pub mod forge;
pub mod group_team;
pub mod labels;
pub mod member;
pub mod metadata;
pub mod operations;
pub mod organization;
pub mod provider;
pub mod ratelimit;
pub mod state;
pub mod team;
pub mod team_repository;
pub mod ttl;

pub use metadata::{ObjectKey, ObjectMeta, StoreObject};

/// Store object name of the Organization record for `(forge, org)`.
///
/// Organization records follow the `{forge}--{org}` naming convention,
/// lowercased, so that dependents can resolve them without a label query.
pub fn organization_object_name(forge: &str, organization: &str) -> String {
    format!(
        "{}--{}",
        forge.to_lowercase(),
        organization.to_lowercase()
    )
}

/// Store object name of the Team record for `(forge, org, team)`.
pub fn team_object_name(forge: &str, organization: &str, team: &str) -> String {
    format!(
        "{}--{}--{}",
        forge.to_lowercase(),
        organization.to_lowercase(),
        team.to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_naming_convention() {
        assert_eq!(
            organization_object_name("MyForge", "Acme"),
            "myforge--acme"
        );
        assert_eq!(
            team_object_name("MyForge", "Acme", "Platform-Eng"),
            "myforge--acme--platform-eng"
        );
    }
}
