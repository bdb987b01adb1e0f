//! Per-repository permission overrides.
//!
//! Passive input for the Organization reconciler: named repositories get
//! the listed team with the listed permission on top of (or instead of)
//! the organization defaults. No status is kept.

use serde::{Deserialize, Serialize};

use crate::impl_store_object;
use crate::metadata::ObjectMeta;
use crate::operations::Permission;

/// Override record granting one team a permission on named repositories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRepository {
    pub metadata: ObjectMeta,
    pub spec: TeamRepositorySpec,
}

impl_store_object!(TeamRepository, "TeamRepository");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRepositorySpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub forge: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organization: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub team: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<String>,
    pub permission: Permission,
}

impl TeamRepository {
    /// Whether this override applies to `repo`.
    #[must_use]
    pub fn covers(&self, repo: &str) -> bool {
        self.spec.repositories.iter().any(|r| r == repo)
    }
}
