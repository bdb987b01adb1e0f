//! Forge reconciler: turns a Forge resource plus its credentials secret
//! into an authenticated client in the process-wide registry.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use forge_guard_core::forge::{
    Forge, ForgeState, SECRET_CLIENT_ID, SECRET_CLIENT_SECRET, SECRET_PRIVATE_KEY,
};
use forge_guard_core::ObjectKey;
use forge_guard_forge::AppCredentials;
use forge_guard_store::Secret;

use crate::context::Context;
use crate::error::ControllerResult;
use crate::reconcile::ReconcileOutcome;

pub struct ForgeReconciler {
    ctx: Arc<Context>,
}

impl ForgeReconciler {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Reconcile contract: read the secret, build the client, probe the
    /// app endpoint, publish. Failures are recorded in the status without
    /// a requeue; the next spec or secret change re-triggers the key.
    pub async fn reconcile(&self, key: &ObjectKey) -> ControllerResult<ReconcileOutcome> {
        let Some(mut forge) = self.ctx.stores.forges.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };

        let secret_key = ObjectKey::new(key.namespace.clone(), forge.spec.secret_ref.clone());
        let secret = match self.ctx.stores.secrets.get(&secret_key).await? {
            Some(secret) => secret,
            None => {
                warn!(forge = %forge.metadata.name, secret = %secret_key, "credentials secret not found");
                return self
                    .fail(forge, format!("error in getting secret: {secret_key} not found"))
                    .await;
            }
        };

        let credentials = match read_credentials(&secret) {
            Ok(credentials) => credentials,
            Err(message) => return self.fail(forge, message).await,
        };

        let client = match self.ctx.client_factory.build(&forge, &credentials) {
            Ok(client) => client,
            Err(e) => {
                return self
                    .fail(forge, format!("error in forge client creation: {e}"))
                    .await
            }
        };

        if let Err(e) = client.check_app().await {
            return self
                .fail(forge, format!("error in forge app client creation: {e}"))
                .await;
        }

        self.ctx
            .registries
            .forges
            .insert(forge.metadata.name.clone(), client)
            .await;

        forge.status.set(ForgeState::Running, "", Utc::now());
        self.ctx.stores.forges.update_status(forge.clone()).await?;
        info!(forge = %forge.metadata.name, "forge client configured and running");
        Ok(ReconcileOutcome::Done)
    }

    async fn fail(&self, mut forge: Forge, error: String) -> ControllerResult<ReconcileOutcome> {
        forge.status.set(ForgeState::Failed, error, Utc::now());
        self.ctx.stores.forges.update_status(forge).await?;
        Ok(ReconcileOutcome::Done)
    }
}

fn read_credentials(secret: &Secret) -> Result<AppCredentials, String> {
    let field = |key: &str| {
        secret
            .string_data(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("secret is missing key {key}"))
    };
    Ok(AppCredentials {
        client_id: field(SECRET_CLIENT_ID)?,
        client_secret: field(SECRET_CLIENT_SECRET)?,
        private_key: field(SECRET_PRIVATE_KEY)?,
    })
}
