//! Controller configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_workers_per_kind() -> usize {
    2
}

fn default_registry_wait_secs() -> u64 {
    1
}

fn default_owner_settle_secs() -> u64 {
    5
}

fn default_error_requeue_secs() -> u64 {
    1
}

/// Tunables for the reconcile loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Worker tasks per resource kind.
    #[serde(default = "default_workers_per_kind")]
    pub workers_per_kind: usize,
    /// Requeue delay while a registry entry is not yet published.
    #[serde(default = "default_registry_wait_secs")]
    pub registry_wait_secs: u64,
    /// Delay after an applied owner change, and while owner teams are not
    /// ready, letting the forge settle before the next diff.
    #[serde(default = "default_owner_settle_secs")]
    pub owner_settle_secs: u64,
    /// Requeue delay after a reconcile error.
    #[serde(default = "default_error_requeue_secs")]
    pub error_requeue_secs: u64,
}

impl ControllerConfig {
    #[must_use]
    pub fn registry_wait(&self) -> Duration {
        Duration::from_secs(self.registry_wait_secs)
    }

    #[must_use]
    pub fn owner_settle(&self) -> Duration {
        Duration::from_secs(self.owner_settle_secs)
    }

    #[must_use]
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers_per_kind: default_workers_per_kind(),
            registry_wait_secs: default_registry_wait_secs(),
            owner_settle_secs: default_owner_settle_secs(),
            error_requeue_secs: default_error_requeue_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.workers_per_kind, 2);
        assert_eq!(config.registry_wait(), Duration::from_secs(1));
        assert_eq!(config.owner_settle(), Duration::from_secs(5));
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let config: ControllerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.workers_per_kind, 2);

        let config: ControllerConfig =
            serde_json::from_str(r#"{"workers_per_kind": 4}"#).unwrap();
        assert_eq!(config.workers_per_kind, 4);
        assert_eq!(config.error_requeue(), Duration::from_secs(1));
    }
}
