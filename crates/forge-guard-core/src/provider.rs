//! External member provider resources (directory, HTTP, static).
//!
//! Each provider resource is reconciled into a client implementing the
//! `MemberSource` capability and published in the provider registry under
//! the resource name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::impl_store_object;
use crate::metadata::ObjectMeta;

/// Well-known keys inside the directory provider secret.
pub const SECRET_BIND_DN: &str = "bindDN";
pub const SECRET_BIND_PW: &str = "bindPW";

/// Well-known keys inside the HTTP provider secret.
pub const SECRET_USERNAME: &str = "username";
pub const SECRET_PASSWORD: &str = "password";
pub const SECRET_TOKEN: &str = "token";

/// Lifecycle of a provider registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderState {
    Running,
    Failed,
}

impl ProviderState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderState::Running => "running",
            ProviderState::Failed => "failed",
        }
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status shared by all provider kinds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ProviderState>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ProviderStatus {
    pub fn set(&mut self, state: ProviderState, error: impl Into<String>, now: DateTime<Utc>) {
        self.state = Some(state);
        self.error = error.into();
        self.timestamp = Some(now);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == Some(ProviderState::Running)
    }
}

/// Directory-service group provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryProvider {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: DirectoryProviderSpec,
    #[serde(default)]
    pub status: ProviderStatus,
}

impl_store_object!(DirectoryProvider, "DirectoryProvider");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryProviderSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_dn: String,
    /// Name of the secret holding bindDN / bindPW.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_ref: String,
}

/// Generic HTTP group provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpProvider {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: HttpProviderSpec,
    #[serde(default)]
    pub status: ProviderStatus,
}

impl_store_object!(HttpProvider, "HttpProvider");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpProviderSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
    /// Name of the secret holding username / password / token; optional.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_ref: String,
    /// Array field inside a structured response body; a bare array is
    /// expected when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub results_field: String,
    /// Id field of object items; defaults to `id`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id_field: String,
    #[serde(default)]
    pub paginated: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub total_pages_field: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub page_param: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub test_connection_url: String,
}

/// Inline static group provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticProvider {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: StaticProviderSpec,
    #[serde(default)]
    pub status: ProviderStatus,
}

impl_store_object!(StaticProvider, "StaticProvider");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticProviderSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<StaticGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticGroup {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}
