//! Directory-backed member source implementation.

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use forge_guard_connector::{ConnectorError, ConnectorResult, MemberSource};

use crate::config::DirectoryConfig;

const MEMBER_ATTRIBUTE: &str = "member";

/// Member source backed by a directory service.
///
/// The connection is established and bound eagerly at construction so
/// that registration surfaces credential problems immediately. A dropped
/// connection is re-dialed transparently, once per call.
pub struct DirectorySource {
    config: DirectoryConfig,
    ldap: Mutex<Ldap>,
}

impl DirectorySource {
    /// Dial and bind.
    pub async fn connect(config: DirectoryConfig) -> ConnectorResult<Self> {
        let ldap = dial(&config).await?;
        info!(host = %config.host, "directory connection established");
        Ok(Self {
            config,
            ldap: Mutex::new(ldap),
        })
    }

    async fn reconnect(&self) -> ConnectorResult<Ldap> {
        warn!(host = %self.config.host, "directory connection lost, re-dialing");
        let fresh = dial(&self.config).await?;
        let mut guard = self.ldap.lock().await;
        *guard = fresh.clone();
        Ok(fresh)
    }

    async fn handle(&self) -> Ldap {
        self.ldap.lock().await.clone()
    }

    async fn search_group(&self, group: &str) -> Result<Vec<SearchEntry>, LdapError> {
        let filter = format!(
            "(&(objectCategory=group)(CN={}))",
            escape_filter_value(group)
        );
        debug!(group, filter = %filter, "searching directory for group");
        let mut ldap = self.handle().await;
        let (entries, _result) = ldap
            .search(
                &self.config.base_dn,
                Scope::Subtree,
                &filter,
                vec!["*"],
            )
            .await?
            .success()?;
        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }

    async fn probe(&self) -> Result<(), LdapError> {
        let mut ldap = self.handle().await;
        ldap.search(
            &self.config.base_dn,
            Scope::Base,
            "(objectClass=*)",
            vec!["dn"],
        )
        .await?
        .success()?;
        Ok(())
    }
}

async fn dial(config: &DirectoryConfig) -> ConnectorResult<Ldap> {
    let settings = LdapConnSettings::new()
        .set_conn_timeout(Duration::from_secs(config.connect_timeout_secs));
    let url = config.dial_url();
    let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
        .await
        .map_err(|e| {
            ConnectorError::connection_failed_with_source(
                format!("failed to connect to directory at {url}"),
                e,
            )
        })?;

    tokio::spawn(async move {
        if let Err(e) = conn.drive().await {
            warn!(error = %e, "directory connection driver error");
        }
    });

    ldap.simple_bind(&config.bind_dn, &config.bind_password)
        .await
        .and_then(|res| res.success())
        .map_err(|e| {
            ConnectorError::connection_failed_with_source(
                format!("directory bind failed for {}", config.bind_dn),
                e,
            )
        })?;

    Ok(ldap)
}

/// Whether the error means the server closed the connection under us.
fn connection_closed(error: &LdapError) -> bool {
    matches!(
        error,
        LdapError::EndOfStream
            | LdapError::Io { .. }
            | LdapError::OpSend { .. }
            | LdapError::ResultRecv { .. }
    )
}

/// Escape a value embedded in a search filter (RFC 4515).
fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Extract the CN from a member DN: split on `,`, take the segment whose
/// key is `CN` or `cn`.
fn parse_cn(dn: &str) -> Option<String> {
    for segment in dn.split(',') {
        let mut parts = segment.splitn(2, '=');
        let key = parts.next()?.trim();
        if let Some(value) = parts.next() {
            if key == "CN" || key == "cn" {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[async_trait]
impl MemberSource for DirectorySource {
    async fn users(&self, group: &str) -> ConnectorResult<Vec<String>> {
        let entries = match self.search_group(group).await {
            Ok(entries) => entries,
            Err(e) if connection_closed(&e) => {
                self.reconnect().await?;
                self.search_group(group).await.map_err(|e| {
                    ConnectorError::request_failed_with_source("group search failed", e)
                })?
            }
            Err(e) => {
                return Err(ConnectorError::request_failed_with_source(
                    "group search failed",
                    e,
                ))
            }
        };

        let mut usernames = Vec::new();
        for entry in entries {
            if let Some(members) = entry.attrs.get(MEMBER_ATTRIBUTE) {
                for dn in members {
                    if let Some(cn) = parse_cn(dn) {
                        usernames.push(cn.to_uppercase());
                    }
                }
            }
        }
        Ok(usernames)
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        match self.probe().await {
            Ok(()) => Ok(()),
            Err(e) if connection_closed(&e) => {
                self.reconnect().await?;
                self.probe().await.map_err(|e| {
                    ConnectorError::request_failed_with_source("directory probe failed", e)
                })
            }
            Err(e) => Err(ConnectorError::request_failed_with_source(
                "directory probe failed",
                e,
            )),
        }
    }
}
