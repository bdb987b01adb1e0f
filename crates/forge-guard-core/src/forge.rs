//! Forge resource: one API endpoint plus app credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::impl_store_object;
use crate::metadata::ObjectMeta;

/// Well-known keys inside the credentials secret referenced by `secret_ref`.
pub const SECRET_CLIENT_ID: &str = "clientID";
pub const SECRET_CLIENT_SECRET: &str = "clientSecret";
pub const SECRET_PRIVATE_KEY: &str = "privateKey";

/// A forge installation the controller authenticates against.
///
/// Created externally and reconciled into an authenticated client in the
/// process-wide registry; never deleted by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forge {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ForgeSpec,
    #[serde(default)]
    pub status: ForgeStatus,
}

impl_store_object!(Forge, "Forge");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub web_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub v3_api_url: String,
    #[serde(default)]
    pub integration_id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_user_agent: String,
    /// Name of the secret holding clientID / clientSecret / privateKey.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_ref: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ForgeState>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ForgeStatus {
    /// Status transition helper used by the reconciler.
    pub fn set(&mut self, state: ForgeState, error: impl Into<String>, now: DateTime<Utc>) {
        self.state = Some(state);
        self.error = error.into();
        self.timestamp = Some(now);
    }
}

/// Lifecycle of a forge client registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgeState {
    /// Client built, liveness call succeeded, registry entry published.
    Running,
    /// Secret missing or client construction / liveness failed.
    Failed,
}

impl ForgeState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ForgeState::Running => "running",
            ForgeState::Failed => "failed",
        }
    }
}

impl fmt::Display for ForgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_set() {
        let now = Utc::now();
        let mut status = ForgeStatus::default();
        status.set(ForgeState::Failed, "no secret", now);
        assert_eq!(status.state, Some(ForgeState::Failed));
        assert_eq!(status.error, "no secret");
        assert_eq!(status.timestamp, Some(now));
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ForgeState::Running).unwrap(),
            "\"running\""
        );
    }
}
