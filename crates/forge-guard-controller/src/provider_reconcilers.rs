//! Provider reconcilers: construct member sources from their resources
//! and publish them in the provider registries.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use forge_guard_connector::{MemberSource, StaticSource};
use forge_guard_connector_http::{HttpSource, HttpSourceConfig};
use forge_guard_connector_ldap::{DirectoryConfig, DirectorySource};
use forge_guard_core::provider::{
    ProviderState, SECRET_BIND_DN, SECRET_BIND_PW, SECRET_PASSWORD, SECRET_TOKEN, SECRET_USERNAME,
};
use forge_guard_core::ObjectKey;

use crate::context::Context;
use crate::error::ControllerResult;
use crate::reconcile::ReconcileOutcome;

/// Reconciles directory provider resources into directory sources.
pub struct DirectoryProviderReconciler {
    ctx: Arc<Context>,
}

impl DirectoryProviderReconciler {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> ControllerResult<ReconcileOutcome> {
        let Some(mut provider) = self.ctx.stores.directory_providers.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };

        let secret_key = ObjectKey::new(key.namespace.clone(), provider.spec.secret_ref.clone());
        let Some(secret) = self.ctx.stores.secrets.get(&secret_key).await? else {
            provider.status.set(
                ProviderState::Failed,
                format!("error in getting secret: {secret_key} not found"),
                Utc::now(),
            );
            self.ctx
                .stores
                .directory_providers
                .update_status(provider)
                .await?;
            return Ok(ReconcileOutcome::Done);
        };

        let config = DirectoryConfig {
            host: provider.spec.host.clone(),
            base_dn: provider.spec.base_dn.clone(),
            bind_dn: secret.string_data(SECRET_BIND_DN).unwrap_or_default(),
            bind_password: secret.string_data(SECRET_BIND_PW).unwrap_or_default(),
            connect_timeout_secs: 30,
        };

        let started = Instant::now();
        let source = match DirectorySource::connect(config).await {
            Ok(source) => source,
            Err(e) => {
                self.ctx.metrics.observe_external_request(
                    "directory_provider",
                    "connect",
                    "error",
                    started,
                );
                warn!(provider = %provider.metadata.name, error = %e, "directory client creation failed");
                provider.status.set(
                    ProviderState::Failed,
                    format!("error during client creation: {e}"),
                    Utc::now(),
                );
                self.ctx
                    .stores
                    .directory_providers
                    .update_status(provider)
                    .await?;
                return Ok(ReconcileOutcome::Done);
            }
        };

        let probe_started = Instant::now();
        if let Err(e) = source.test_connection().await {
            self.ctx.metrics.observe_external_request(
                "directory_provider",
                "test_connection",
                "error",
                probe_started,
            );
            provider.status.set(
                ProviderState::Failed,
                format!("error during connection test: {e}"),
                Utc::now(),
            );
            self.ctx
                .stores
                .directory_providers
                .update_status(provider)
                .await?;
            return Ok(ReconcileOutcome::Done);
        }
        self.ctx.metrics.observe_external_request(
            "directory_provider",
            "test_connection",
            "success",
            probe_started,
        );

        self.ctx
            .registries
            .directory_providers
            .insert(provider.metadata.name.clone(), Arc::new(source))
            .await;

        provider.status.set(ProviderState::Running, "", Utc::now());
        self.ctx
            .stores
            .directory_providers
            .update_status(provider.clone())
            .await?;
        info!(provider = %provider.metadata.name, "directory provider configured and running");
        Ok(ReconcileOutcome::Done)
    }
}

/// Reconciles HTTP provider resources into HTTP sources.
pub struct HttpProviderReconciler {
    ctx: Arc<Context>,
}

impl HttpProviderReconciler {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> ControllerResult<ReconcileOutcome> {
        let Some(mut provider) = self.ctx.stores.http_providers.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };

        let mut username = String::new();
        let mut password = String::new();
        let mut token = String::new();
        if !provider.spec.secret_ref.is_empty() {
            let secret_key =
                ObjectKey::new(key.namespace.clone(), provider.spec.secret_ref.clone());
            let Some(secret) = self.ctx.stores.secrets.get(&secret_key).await? else {
                provider.status.set(
                    ProviderState::Failed,
                    format!("error in getting secret: {secret_key} not found"),
                    Utc::now(),
                );
                self.ctx
                    .stores
                    .http_providers
                    .update_status(provider)
                    .await?;
                return Ok(ReconcileOutcome::Done);
            };
            username = secret.string_data(SECRET_USERNAME).unwrap_or_default();
            password = secret.string_data(SECRET_PASSWORD).unwrap_or_default();
            token = secret.string_data(SECRET_TOKEN).unwrap_or_default();
        }

        let config = HttpSourceConfig {
            results_field: provider.spec.results_field.clone(),
            id_field: provider.spec.id_field.clone(),
            paginated: provider.spec.paginated,
            total_pages_field: provider.spec.total_pages_field.clone(),
            page_param: provider.spec.page_param.clone(),
            test_connection_url: provider.spec.test_connection_url.clone(),
        };

        let source = match HttpSource::new(
            provider.spec.endpoint.clone(),
            username,
            password,
            token,
            config,
        ) {
            Ok(source) => source,
            Err(e) => {
                provider.status.set(
                    ProviderState::Failed,
                    format!("error during client creation: {e}"),
                    Utc::now(),
                );
                self.ctx
                    .stores
                    .http_providers
                    .update_status(provider)
                    .await?;
                return Ok(ReconcileOutcome::Done);
            }
        };

        let started = Instant::now();
        if let Err(e) = source.test_connection().await {
            self.ctx.metrics.observe_external_request(
                "http_provider",
                "test_connection",
                "error",
                started,
            );
            warn!(provider = %provider.metadata.name, error = %e, "http provider connection test failed");
            provider.status.set(
                ProviderState::Failed,
                format!("error during connection test: {e}"),
                Utc::now(),
            );
            self.ctx
                .stores
                .http_providers
                .update_status(provider)
                .await?;
            return Ok(ReconcileOutcome::Done);
        }
        self.ctx.metrics.observe_external_request(
            "http_provider",
            "test_connection",
            "success",
            started,
        );

        self.ctx
            .registries
            .http_providers
            .insert(provider.metadata.name.clone(), Arc::new(source))
            .await;

        provider.status.set(ProviderState::Running, "", Utc::now());
        self.ctx
            .stores
            .http_providers
            .update_status(provider.clone())
            .await?;
        info!(provider = %provider.metadata.name, "http provider configured and running");
        Ok(ReconcileOutcome::Done)
    }
}

/// Reconciles static provider resources into in-memory sources.
pub struct StaticProviderReconciler {
    ctx: Arc<Context>,
}

impl StaticProviderReconciler {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> ControllerResult<ReconcileOutcome> {
        let Some(mut provider) = self.ctx.stores.static_providers.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };

        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for group in &provider.spec.groups {
            groups.insert(group.group.clone(), group.members.clone());
        }
        let source: Arc<dyn MemberSource> = Arc::new(StaticSource::new(groups));

        self.ctx
            .registries
            .static_providers
            .insert(provider.metadata.name.clone(), source)
            .await;

        provider.status.set(ProviderState::Running, "", Utc::now());
        self.ctx
            .stores
            .static_providers
            .update_status(provider.clone())
            .await?;
        info!(provider = %provider.metadata.name, "static provider configured and running");
        Ok(ReconcileOutcome::Done)
    }
}
