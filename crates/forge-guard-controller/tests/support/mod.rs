//! Test support: an in-memory forge double and a seeded harness.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use forge_guard_controller::account_link_reconciler::AccountLinkReconciler;
use forge_guard_controller::forge_reconciler::ForgeReconciler;
use forge_guard_controller::organization_reconciler::OrganizationReconciler;
use forge_guard_controller::team_reconciler::TeamReconciler;
use forge_guard_controller::{
    Context, ControllerConfig, ControllerResult, ForgeClientFactory, ReconcileOutcome, Stores,
};
use forge_guard_core::account_link::{AccountLink, AccountLinkSpec};
use forge_guard_core::forge::{Forge, ForgeSpec};
use forge_guard_core::group_team::{GroupMember, GroupTeam, GroupTeamStatus};
use forge_guard_core::operations::Permission;
use forge_guard_core::organization::{
    Organization, OrganizationSpec, Repository, TeamWithPermission,
};
use forge_guard_core::organization_object_name;
use forge_guard_core::team::{Team, TeamSpec};
use forge_guard_core::team_object_name;
use forge_guard_core::{ObjectKey, ObjectMeta};
use forge_guard_forge::{
    AppCredentials, ForgeAccount, ForgeApi, ForgeError, ForgeResult, RepositoryListing,
};
use forge_guard_store::{MemoryStore, ResourceStore, Secret};

pub const FORGE: &str = "main";
pub const ORG: &str = "org1";
pub const INSTALLATION: i64 = 7;

#[derive(Default)]
struct MockForgeState {
    teams: HashMap<String, Vec<ForgeAccount>>,
    owners: Vec<ForgeAccount>,
    users: HashMap<i64, String>,
    repositories: RepositoryListing,
    verified: HashMap<(String, String, String), bool>,
    fail_list_teams_with: Option<String>,
    fail_demote_with: Option<String>,
    calls: u64,
    mutations: Vec<String>,
}

/// In-memory forge standing in for the real API.
#[derive(Default)]
pub struct MockForge {
    state: Mutex<MockForgeState>,
}

impl MockForge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn add_user(&self, id: i64, login: &str) {
        self.state.lock().await.users.insert(id, login.to_string());
    }

    pub async fn add_team(&self, team: &str) {
        self.state
            .lock()
            .await
            .teams
            .insert(team.to_string(), Vec::new());
    }

    pub async fn team_logins(&self, team: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .teams
            .get(team)
            .map(|members| members.iter().map(|m| m.login.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn set_owners(&self, owners: Vec<ForgeAccount>) {
        self.state.lock().await.owners = owners;
    }

    pub async fn owner_logins(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .owners
            .iter()
            .map(|o| o.login.clone())
            .collect()
    }

    pub async fn set_repositories(&self, listing: RepositoryListing) {
        self.state.lock().await.repositories = listing;
    }

    pub async fn repository_teams(&self, repo: &str) -> Vec<TeamWithPermission> {
        let state = self.state.lock().await;
        state
            .repositories
            .public
            .iter()
            .chain(state.repositories.private.iter())
            .find(|r| r.name == repo)
            .map(|r| r.teams.clone())
            .unwrap_or_default()
    }

    pub async fn set_verified(&self, org: &str, uid: &str, domain: &str, verified: bool) {
        self.state.lock().await.verified.insert(
            (org.to_string(), uid.to_string(), domain.to_string()),
            verified,
        );
    }

    pub async fn fail_list_teams_with(&self, message: &str) {
        self.state.lock().await.fail_list_teams_with = Some(message.to_string());
    }

    pub async fn fail_demote_with(&self, message: &str) {
        self.state.lock().await.fail_demote_with = Some(message.to_string());
    }

    /// Total API calls, reads included.
    pub async fn call_count(&self) -> u64 {
        self.state.lock().await.calls
    }

    /// Log of mutating calls.
    pub async fn mutations(&self) -> Vec<String> {
        self.state.lock().await.mutations.clone()
    }
}

#[async_trait]
impl ForgeApi for MockForge {
    async fn check_app(&self) -> ForgeResult<()> {
        self.state.lock().await.calls += 1;
        Ok(())
    }

    async fn list_teams(&self, _installation: i64, _org: &str) -> ForgeResult<Vec<String>> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        if let Some(message) = &state.fail_list_teams_with {
            return Err(ForgeError::api(403, message.clone()));
        }
        Ok(state.teams.keys().cloned().collect())
    }

    async fn team_members(
        &self,
        _installation: i64,
        _org: &str,
        team: &str,
    ) -> ForgeResult<Vec<ForgeAccount>> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        Ok(state.teams.get(team).cloned().unwrap_or_default())
    }

    async fn create_team(&self, _installation: i64, _org: &str, team: &str) -> ForgeResult<()> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        state.mutations.push(format!("create_team {team}"));
        state.teams.entry(team.to_string()).or_default();
        Ok(())
    }

    async fn delete_team(&self, _installation: i64, _org: &str, team: &str) -> ForgeResult<()> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        state.mutations.push(format!("delete_team {team}"));
        state.teams.remove(team);
        Ok(())
    }

    async fn add_team_member(
        &self,
        _installation: i64,
        _org: &str,
        team: &str,
        login: &str,
    ) -> ForgeResult<()> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        state.mutations.push(format!("add_team_member {team} {login}"));
        let Some((id, canonical)) = state
            .users
            .iter()
            .find(|(_, l)| l.eq_ignore_ascii_case(login))
            .map(|(id, l)| (*id, l.clone()))
        else {
            return Err(ForgeError::MemberNotFound);
        };
        let members = state.teams.entry(team.to_string()).or_default();
        if !members.iter().any(|m| m.login.eq_ignore_ascii_case(login)) {
            members.push(ForgeAccount::new(canonical, id));
        }
        Ok(())
    }

    async fn remove_team_member(
        &self,
        _installation: i64,
        _org: &str,
        team: &str,
        login: &str,
    ) -> ForgeResult<()> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        state
            .mutations
            .push(format!("remove_team_member {team} {login}"));
        if let Some(members) = state.teams.get_mut(team) {
            members.retain(|m| !m.login.eq_ignore_ascii_case(login));
        }
        Ok(())
    }

    async fn organization_owners(
        &self,
        _installation: i64,
        _org: &str,
    ) -> ForgeResult<Vec<ForgeAccount>> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        Ok(state.owners.clone())
    }

    async fn promote_to_owner(
        &self,
        _installation: i64,
        _org: &str,
        login: &str,
    ) -> ForgeResult<()> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        state.mutations.push(format!("promote_to_owner {login}"));
        let id = state
            .users
            .iter()
            .find(|(_, l)| l.eq_ignore_ascii_case(login))
            .map(|(id, _)| *id)
            .unwrap_or_default();
        if !state.owners.iter().any(|o| o.login.eq_ignore_ascii_case(login)) {
            state.owners.push(ForgeAccount::new(login, id));
        }
        Ok(())
    }

    async fn demote_to_member(
        &self,
        _installation: i64,
        _org: &str,
        login: &str,
    ) -> ForgeResult<()> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        state.mutations.push(format!("demote_to_member {login}"));
        if let Some(message) = &state.fail_demote_with {
            return Err(ForgeError::api(403, message.clone()));
        }
        state.owners.retain(|o| !o.login.eq_ignore_ascii_case(login));
        Ok(())
    }

    async fn list_repositories(
        &self,
        _installation: i64,
        _org: &str,
    ) -> ForgeResult<RepositoryListing> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        Ok(RepositoryListing {
            public: state.repositories.public.clone(),
            private: state.repositories.private.clone(),
        })
    }

    async fn add_repository_team(
        &self,
        _installation: i64,
        _org: &str,
        repo: &str,
        team: &str,
        permission: Permission,
    ) -> ForgeResult<()> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        state
            .mutations
            .push(format!("add_repository_team {repo} {team} {permission}"));
        let repositories = &mut state.repositories;
        for repository in repositories
            .public
            .iter_mut()
            .chain(repositories.private.iter_mut())
        {
            if repository.name == repo {
                repository.teams.retain(|t| t.team != team);
                repository
                    .teams
                    .push(TeamWithPermission::new(team, permission));
            }
        }
        Ok(())
    }

    async fn remove_repository_team(
        &self,
        _installation: i64,
        _org: &str,
        repo: &str,
        team: &str,
    ) -> ForgeResult<()> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        state
            .mutations
            .push(format!("remove_repository_team {repo} {team}"));
        let repositories = &mut state.repositories;
        for repository in repositories
            .public
            .iter_mut()
            .chain(repositories.private.iter_mut())
        {
            if repository.name == repo {
                repository.teams.retain(|t| t.team != team);
            }
        }
        Ok(())
    }

    async fn login_by_user_id(
        &self,
        _installation: i64,
        user_id: i64,
    ) -> ForgeResult<Option<String>> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        Ok(state.users.get(&user_id).cloned())
    }

    async fn user_id_by_login(
        &self,
        _installation: i64,
        login: &str,
    ) -> ForgeResult<Option<i64>> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        Ok(state
            .users
            .iter()
            .find(|(_, l)| l.eq_ignore_ascii_case(login))
            .map(|(id, _)| *id))
    }

    async fn verified_domain_email(
        &self,
        _installation: i64,
        org: &str,
        user_id: &str,
        domain: &str,
    ) -> ForgeResult<bool> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        Ok(*state
            .verified
            .get(&(org.to_string(), user_id.to_string(), domain.to_string()))
            .unwrap_or(&false))
    }
}

/// Factory handing out the shared mock regardless of credentials.
pub struct MockFactory {
    pub forge: Arc<MockForge>,
}

impl ForgeClientFactory for MockFactory {
    fn build(
        &self,
        _forge: &Forge,
        _credentials: &AppCredentials,
    ) -> ForgeResult<Arc<dyn ForgeApi>> {
        Ok(Arc::clone(&self.forge) as Arc<dyn ForgeApi>)
    }
}

/// Seeded engine context with direct access to the reconcilers.
pub struct Harness {
    pub ctx: Arc<Context>,
    pub forge: Arc<MockForge>,
    pub teams: TeamReconciler,
    pub organizations: OrganizationReconciler,
    pub account_links: AccountLinkReconciler,
    pub forges: ForgeReconciler,
}

impl Harness {
    /// Context over memory stores with the mock forge registered as `main`.
    pub async fn new() -> Self {
        let stores = Stores {
            forges: MemoryStore::new(),
            organizations: MemoryStore::new(),
            teams: MemoryStore::new(),
            team_repositories: MemoryStore::new(),
            account_links: MemoryStore::new(),
            group_teams: MemoryStore::new(),
            directory_providers: MemoryStore::new(),
            http_providers: MemoryStore::new(),
            static_providers: MemoryStore::new(),
            secrets: MemoryStore::new(),
        };
        let forge = MockForge::new();
        let ctx = Context::with_client_factory(
            stores,
            ControllerConfig::default(),
            Arc::new(MockFactory {
                forge: Arc::clone(&forge),
            }),
        );

        ctx.stores
            .forges
            .create(Forge {
                metadata: ObjectMeta::named(FORGE),
                spec: ForgeSpec {
                    v3_api_url: "https://forge.example/api/v3".to_string(),
                    integration_id: 99,
                    client_user_agent: "forge-guard-test".to_string(),
                    secret_ref: "forge-credentials".to_string(),
                    ..ForgeSpec::default()
                },
                ..Forge::default()
            })
            .await
            .expect("seed forge");
        ctx.registries
            .forges
            .insert(FORGE, Arc::clone(&forge) as Arc<dyn ForgeApi>)
            .await;

        Self {
            teams: TeamReconciler::new(Arc::clone(&ctx)),
            organizations: OrganizationReconciler::new(Arc::clone(&ctx)),
            account_links: AccountLinkReconciler::new(Arc::clone(&ctx)),
            forges: ForgeReconciler::new(Arc::clone(&ctx)),
            ctx,
            forge,
        }
    }

    pub async fn seed_organization(&self, owner_teams: &[&str]) -> ObjectKey {
        self.seed_organization_with_defaults(
            owner_teams,
            vec![TeamWithPermission::new("all", Permission::Pull)],
            vec![TeamWithPermission::new("eng", Permission::Push)],
        )
        .await
    }

    pub async fn seed_organization_with_defaults(
        &self,
        owner_teams: &[&str],
        public_defaults: Vec<TeamWithPermission>,
        private_defaults: Vec<TeamWithPermission>,
    ) -> ObjectKey {
        let org = Organization {
            metadata: ObjectMeta::named(organization_object_name(FORGE, ORG)),
            spec: OrganizationSpec {
                forge: FORGE.to_string(),
                organization: ORG.to_string(),
                organization_owner_teams: owner_teams.iter().map(|s| s.to_string()).collect(),
                default_public_repository_teams: public_defaults,
                default_private_repository_teams: private_defaults,
                installation_id: INSTALLATION,
            },
            ..Organization::default()
        };
        let key = org.metadata.key();
        self.ctx
            .stores
            .organizations
            .create(org)
            .await
            .expect("seed organization");
        key
    }

    pub async fn seed_team(&self, team_name: &str, group_team: &str) -> ObjectKey {
        let team = Team {
            metadata: ObjectMeta::named(team_object_name(FORGE, ORG, team_name)),
            spec: TeamSpec {
                forge: FORGE.to_string(),
                organization: ORG.to_string(),
                team: team_name.to_string(),
                greenhouse_team: Some(group_team.to_string()),
                external_member_provider: None,
            },
            ..Team::default()
        };
        let key = team.metadata.key();
        self.ctx.stores.teams.create(team).await.expect("seed team");
        key
    }

    pub async fn seed_group_team(&self, name: &str, member_ids: &[&str]) {
        let team = GroupTeam {
            metadata: ObjectMeta::named(name),
            status: GroupTeamStatus {
                members: member_ids
                    .iter()
                    .map(|id| GroupMember {
                        id: id.to_string(),
                        ..GroupMember::default()
                    })
                    .collect(),
            },
        };
        self.ctx
            .stores
            .group_teams
            .create(team)
            .await
            .expect("seed group team");
    }

    pub async fn set_group_team_members(&self, name: &str, member_ids: &[&str]) {
        let key = ObjectKey::new("", name);
        let mut team = self
            .ctx
            .stores
            .group_teams
            .get(&key)
            .await
            .expect("get group team")
            .expect("group team exists");
        team.status.members = member_ids
            .iter()
            .map(|id| GroupMember {
                id: id.to_string(),
                ..GroupMember::default()
            })
            .collect();
        self.ctx
            .stores
            .group_teams
            .update_status(team)
            .await
            .expect("update group team");
    }

    pub async fn seed_account_link(&self, user_id: &str, forge_user_id: &str) {
        let link = AccountLink {
            metadata: ObjectMeta::named(format!("{}-link", user_id.to_lowercase())),
            spec: AccountLinkSpec {
                user_id: user_id.to_string(),
                forge_user_id: forge_user_id.to_string(),
                forge: FORGE.to_string(),
            },
        };
        self.ctx
            .stores
            .account_links
            .create(link)
            .await
            .expect("seed account link");
    }

    pub async fn seed_secret(&self, name: &str, entries: &[(&str, &str)]) {
        let mut secret = Secret::new(ObjectMeta::named(name));
        for (key, value) in entries {
            secret = secret.with_entry(*key, *value);
        }
        self.ctx
            .stores
            .secrets
            .create(secret)
            .await
            .expect("seed secret");
    }

    pub async fn get_team(&self, key: &ObjectKey) -> Team {
        self.ctx
            .stores
            .teams
            .get(key)
            .await
            .expect("get team")
            .expect("team exists")
    }

    pub async fn get_organization(&self, key: &ObjectKey) -> Organization {
        self.ctx
            .stores
            .organizations
            .get(key)
            .await
            .expect("get organization")
            .expect("organization exists")
    }

    pub async fn set_team_label(&self, key: &ObjectKey, label: &str, value: &str) {
        let mut team = self.get_team(key).await;
        team.metadata
            .labels
            .insert(label.to_string(), value.to_string());
        self.ctx
            .stores
            .teams
            .update(team)
            .await
            .expect("update team labels");
    }

    pub async fn set_organization_label(&self, key: &ObjectKey, label: &str, value: &str) {
        let mut org = self.get_organization(key).await;
        org.metadata
            .labels
            .insert(label.to_string(), value.to_string());
        self.ctx
            .stores
            .organizations
            .update(org)
            .await
            .expect("update organization labels");
    }

    /// Drive a team through several reconcile passes, as the work queue
    /// would after the status-write watch events.
    pub async fn converge_team(&self, key: &ObjectKey) -> ControllerResult<Team> {
        for _ in 0..8 {
            self.teams.reconcile(key).await?;
        }
        Ok(self.get_team(key).await)
    }

    /// Drive an organization through several reconcile passes.
    pub async fn converge_organization(
        &self,
        key: &ObjectKey,
    ) -> ControllerResult<Organization> {
        for _ in 0..8 {
            self.organizations.reconcile(key).await?;
        }
        Ok(self.get_organization(key).await)
    }

    pub async fn reconcile_team_once(&self, key: &ObjectKey) -> ControllerResult<ReconcileOutcome> {
        self.teams.reconcile(key).await
    }
}

/// A repository listing with one repository per visibility.
pub fn listing(public: &[(&str, &[TeamWithPermission])], private: &[(&str, &[TeamWithPermission])]) -> RepositoryListing {
    RepositoryListing {
        public: public
            .iter()
            .map(|(name, teams)| Repository {
                name: name.to_string(),
                teams: teams.to_vec(),
            })
            .collect(),
        private: private
            .iter()
            .map(|(name, teams)| Repository {
                name: name.to_string(),
                teams: teams.to_vec(),
            })
            .collect(),
    }
}
