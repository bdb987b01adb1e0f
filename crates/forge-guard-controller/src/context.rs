//! Shared reconciler context: store handles, registries, metrics, config.

use std::sync::Arc;

use forge_guard_core::account_link::AccountLink;
use forge_guard_core::forge::Forge;
use forge_guard_core::group_team::GroupTeam;
use forge_guard_core::organization::Organization;
use forge_guard_core::provider::{DirectoryProvider, HttpProvider, StaticProvider};
use forge_guard_core::team::Team;
use forge_guard_core::team_repository::TeamRepository;
use forge_guard_forge::{AppCredentials, ForgeApi, ForgeResult, RestForgeClient};
use forge_guard_store::{ResourceStore, Secret};

use crate::config::ControllerConfig;
use crate::metrics::ControllerMetrics;
use crate::registry::Registries;

/// Typed store handles for every resource kind the engine consumes.
#[derive(Clone)]
pub struct Stores {
    pub forges: Arc<dyn ResourceStore<Forge>>,
    pub organizations: Arc<dyn ResourceStore<Organization>>,
    pub teams: Arc<dyn ResourceStore<Team>>,
    pub team_repositories: Arc<dyn ResourceStore<TeamRepository>>,
    pub account_links: Arc<dyn ResourceStore<AccountLink>>,
    pub group_teams: Arc<dyn ResourceStore<GroupTeam>>,
    pub directory_providers: Arc<dyn ResourceStore<DirectoryProvider>>,
    pub http_providers: Arc<dyn ResourceStore<HttpProvider>>,
    pub static_providers: Arc<dyn ResourceStore<StaticProvider>>,
    pub secrets: Arc<dyn ResourceStore<Secret>>,
}

/// Builds an authenticated forge client from a Forge spec plus its
/// credentials. The production factory constructs REST clients; tests
/// substitute an in-memory forge.
pub trait ForgeClientFactory: Send + Sync {
    fn build(&self, forge: &Forge, credentials: &AppCredentials) -> ForgeResult<Arc<dyn ForgeApi>>;
}

/// Production factory building [`RestForgeClient`]s.
#[derive(Debug, Default)]
pub struct RestClientFactory;

impl ForgeClientFactory for RestClientFactory {
    fn build(&self, forge: &Forge, credentials: &AppCredentials) -> ForgeResult<Arc<dyn ForgeApi>> {
        let client = RestForgeClient::new(
            &forge.spec.v3_api_url,
            None,
            forge.spec.integration_id,
            credentials,
            &forge.spec.client_user_agent,
        )?;
        Ok(Arc::new(client))
    }
}

/// Everything a reconciler needs, shared across workers.
pub struct Context {
    pub stores: Stores,
    pub registries: Arc<Registries>,
    pub metrics: Arc<ControllerMetrics>,
    pub config: ControllerConfig,
    pub client_factory: Arc<dyn ForgeClientFactory>,
}

impl Context {
    #[must_use]
    pub fn new(stores: Stores, config: ControllerConfig) -> Arc<Self> {
        Arc::new(Self {
            stores,
            registries: Arc::new(Registries::new()),
            metrics: Arc::new(ControllerMetrics::new()),
            config,
            client_factory: Arc::new(RestClientFactory),
        })
    }

    /// Context with a custom client factory (used by the test harness).
    #[must_use]
    pub fn with_client_factory(
        stores: Stores,
        config: ControllerConfig,
        client_factory: Arc<dyn ForgeClientFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            stores,
            registries: Arc::new(Registries::new()),
            metrics: Arc::new(ControllerMetrics::new()),
            config,
            client_factory,
        })
    }
}
