//! Directory source configuration.

use serde::{Deserialize, Serialize};

fn default_connect_timeout_secs() -> u64 {
    30
}

/// Connection settings for one directory service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Host, optionally with a scheme; bare hosts dial `ldaps://`.
    pub host: String,
    /// Search base for group lookups.
    pub base_dn: String,
    pub bind_dn: String,
    pub bind_password: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl DirectoryConfig {
    /// The URL to dial, defaulting bare hosts to `ldaps://`.
    #[must_use]
    pub fn dial_url(&self) -> String {
        if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("ldaps://{}", self.host)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str) -> DirectoryConfig {
        DirectoryConfig {
            host: host.to_string(),
            base_dn: "dc=example,dc=com".to_string(),
            bind_dn: "cn=reader,dc=example,dc=com".to_string(),
            bind_password: "pw".to_string(),
            connect_timeout_secs: 30,
        }
    }

    #[test]
    fn test_dial_url_defaults_to_ldaps() {
        assert_eq!(config("dir.example.com").dial_url(), "ldaps://dir.example.com");
        assert_eq!(
            config("ldap://dir.example.com:389").dial_url(),
            "ldap://dir.example.com:389"
        );
    }
}
