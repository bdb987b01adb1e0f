//! The forge API surface the reconcilers depend on.

use async_trait::async_trait;

use forge_guard_core::operations::Permission;
use forge_guard_core::organization::Repository;

use crate::error::ForgeResult;

/// A forge account as returned by member listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgeAccount {
    pub login: String,
    pub user_id: i64,
}

impl ForgeAccount {
    #[must_use]
    pub fn new(login: impl Into<String>, user_id: i64) -> Self {
        Self {
            login: login.into(),
            user_id,
        }
    }
}

/// Organization repositories partitioned by visibility, with each
/// repository's observed team permissions attached.
#[derive(Debug, Clone, Default)]
pub struct RepositoryListing {
    pub public: Vec<Repository>,
    pub private: Vec<Repository>,
}

/// Authenticated access to one forge, scoped per call by installation id.
///
/// All implementations must keep calls synchronous within a reconcile and
/// honor cancellation through the usual async drop semantics.
#[async_trait]
pub trait ForgeApi: Send + Sync {
    /// Liveness probe for the app credentials (client registration gate).
    async fn check_app(&self) -> ForgeResult<()>;

    // Teams.
    async fn list_teams(&self, installation: i64, org: &str) -> ForgeResult<Vec<String>>;
    async fn team_members(
        &self,
        installation: i64,
        org: &str,
        team: &str,
    ) -> ForgeResult<Vec<ForgeAccount>>;
    async fn create_team(&self, installation: i64, org: &str, team: &str) -> ForgeResult<()>;
    async fn delete_team(&self, installation: i64, org: &str, team: &str) -> ForgeResult<()>;
    /// Adds `login` to the team. A forge 404 maps to
    /// [`crate::ForgeError::MemberNotFound`].
    async fn add_team_member(
        &self,
        installation: i64,
        org: &str,
        team: &str,
        login: &str,
    ) -> ForgeResult<()>;
    async fn remove_team_member(
        &self,
        installation: i64,
        org: &str,
        team: &str,
        login: &str,
    ) -> ForgeResult<()>;

    // Organization owners.
    async fn organization_owners(
        &self,
        installation: i64,
        org: &str,
    ) -> ForgeResult<Vec<ForgeAccount>>;
    async fn promote_to_owner(&self, installation: i64, org: &str, login: &str)
        -> ForgeResult<()>;
    async fn demote_to_member(&self, installation: i64, org: &str, login: &str)
        -> ForgeResult<()>;

    // Repositories.
    async fn list_repositories(
        &self,
        installation: i64,
        org: &str,
    ) -> ForgeResult<RepositoryListing>;
    async fn add_repository_team(
        &self,
        installation: i64,
        org: &str,
        repo: &str,
        team: &str,
        permission: Permission,
    ) -> ForgeResult<()>;
    async fn remove_repository_team(
        &self,
        installation: i64,
        org: &str,
        repo: &str,
        team: &str,
    ) -> ForgeResult<()>;

    // Users.
    async fn login_by_user_id(&self, installation: i64, user_id: i64)
        -> ForgeResult<Option<String>>;
    async fn user_id_by_login(&self, installation: i64, login: &str)
        -> ForgeResult<Option<i64>>;
    /// Whether the user behind `user_id` exposes a verified email whose
    /// domain matches `domain` (case-insensitive) to `org`.
    async fn verified_domain_email(
        &self,
        installation: i64,
        org: &str,
        user_id: &str,
        domain: &str,
    ) -> ForgeResult<bool>;
}
