//! Account link reconciler: periodic per-organization email-domain
//! verification, published through the results annotation.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use forge_guard_core::account_link::EmailCheckResult;
use forge_guard_core::ttl::parse_ttl;
use forge_guard_core::ObjectKey;

use crate::context::Context;
use crate::error::ControllerResult;
use crate::reconcile::ReconcileOutcome;

pub struct AccountLinkReconciler {
    ctx: Arc<Context>,
}

impl AccountLinkReconciler {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Check every enabled organization entry whose previous result has
    /// aged out, then requeue at the shortest configured TTL.
    pub async fn reconcile(&self, key: &ObjectKey) -> ControllerResult<ReconcileOutcome> {
        let Some(mut link) = self.ctx.stores.account_links.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };

        let Some(config) = link.email_check_config() else {
            return Ok(ReconcileOutcome::Done);
        };
        if !config
            .values()
            .any(|entry| entry.enabled && !entry.domain.is_empty())
        {
            return Ok(ReconcileOutcome::Done);
        }

        let mut results = link.email_check_results();
        let mut updated = false;
        let mut min_requeue: Option<Duration> = None;

        for (org_name, entry) in &config {
            if !entry.enabled || entry.domain.is_empty() {
                continue;
            }

            let ttl = match entry.ttl.as_str() {
                "" => None,
                raw => match parse_ttl(raw) {
                    Ok(ttl) => {
                        if let Ok(std_ttl) = ttl.to_std() {
                            min_requeue = Some(match min_requeue {
                                Some(current) if current <= std_ttl => current,
                                _ => std_ttl,
                            });
                        }
                        Some(ttl)
                    }
                    Err(e) => {
                        warn!(link = %key, org = %org_name, error = %e, "invalid email check ttl");
                        None
                    }
                },
            };

            let now = Utc::now();
            let need_check = match results.get(org_name) {
                None => true,
                Some(previous) => match ttl {
                    Some(ttl) => now > previous.timestamp + ttl,
                    None => false,
                },
            };
            if !need_check {
                continue;
            }

            let Some(client) = self.ctx.registries.forges.get(&link.spec.forge).await else {
                info!(link = %key, forge = %link.spec.forge, "waiting for forge client to be initialized");
                return Ok(ReconcileOutcome::RequeueAfter(self.ctx.config.registry_wait()));
            };

            // Resolve the installation scope of this organization.
            let organizations = self.ctx.stores.organizations.list().await?;
            let installation = organizations
                .iter()
                .find(|o| o.spec.forge == link.spec.forge && o.spec.organization == *org_name)
                .map(|o| o.spec.installation_id)
                .unwrap_or(0);

            let verified = if installation == 0 {
                info!(
                    link = %key,
                    org = %org_name,
                    "installation not resolved for email check, recording unverified"
                );
                false
            } else {
                client
                    .verified_domain_email(
                        installation,
                        org_name,
                        &link.spec.forge_user_id,
                        &entry.domain,
                    )
                    .await?
            };

            results.insert(
                org_name.clone(),
                EmailCheckResult {
                    domain: entry.domain.clone(),
                    verified,
                    timestamp: now,
                },
            );
            updated = true;
        }

        if updated {
            link.set_email_check_results(&results);
            self.ctx.stores.account_links.update(link).await?;
        }

        match min_requeue {
            Some(wait) => Ok(ReconcileOutcome::RequeueAfter(wait)),
            None => Ok(ReconcileOutcome::Done),
        }
    }
}
