//! Account link records: internal user id ⇄ numeric forge user id.
//!
//! Links are referenced by the Team and Organization reconcilers for
//! identity translation and carry the email-domain verification surface in
//! their annotations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::impl_store_object;
use crate::labels::{ANNOTATION_EMAIL_CHECK_CONFIG, ANNOTATION_EMAIL_CHECK_RESULTS};
use crate::metadata::ObjectMeta;

/// Bidirectional identity record for one user on one forge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLink {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: AccountLinkSpec,
}

impl_store_object!(AccountLink, "AccountLink");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLinkSpec {
    /// Internal (directory-side) user identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    /// Numeric forge user id, kept as a string on the wire.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub forge_user_id: String,
    /// Name of the Forge this link belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub forge: String,
}

/// Per-organization email-check request, parsed from the
/// `email-check-config` annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailCheckEntry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(default)]
    pub enabled: bool,
    /// Duration string such as `24h`; empty means check once.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ttl: String,
}

/// Per-organization email-check outcome, stored in the
/// `email-check-results` annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailCheckResult {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(default)]
    pub verified: bool,
    pub timestamp: DateTime<Utc>,
}

/// Map from organization name to its check configuration.
pub type EmailCheckConfig = BTreeMap<String, EmailCheckEntry>;

/// Map from organization name to its latest check result.
pub type EmailCheckResults = BTreeMap<String, EmailCheckResult>;

impl AccountLink {
    /// Parse the email-check configuration annotation, if present and
    /// well-formed.
    #[must_use]
    pub fn email_check_config(&self) -> Option<EmailCheckConfig> {
        let raw = self.metadata.annotation(ANNOTATION_EMAIL_CHECK_CONFIG)?;
        if raw.is_empty() {
            return None;
        }
        serde_json::from_str(raw).ok()
    }

    /// Parse the email-check results annotation; malformed or absent
    /// annotations yield an empty map.
    #[must_use]
    pub fn email_check_results(&self) -> EmailCheckResults {
        self.metadata
            .annotation(ANNOTATION_EMAIL_CHECK_RESULTS)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    /// Write the results map back into the annotation.
    pub fn set_email_check_results(&mut self, results: &EmailCheckResults) {
        if let Ok(raw) = serde_json::to_string(results) {
            self.metadata
                .annotations
                .insert(ANNOTATION_EMAIL_CHECK_RESULTS.to_string(), raw);
        }
    }

    /// Whether this link reports a verified email for `domain` in `org`.
    #[must_use]
    pub fn verified_for(&self, org: &str, domain: &str) -> bool {
        self.email_check_results()
            .get(org)
            .map(|r| r.verified && r.domain == domain)
            .unwrap_or(false)
    }
}
