//! HTTP-backed member source implementation.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use forge_guard_connector::{ConnectorError, ConnectorResult, MemberSource};

use crate::config::HttpSourceConfig;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Member source backed by a generic HTTP endpoint.
pub struct HttpSource {
    endpoint: String,
    username: String,
    password: String,
    token: String,
    config: HttpSourceConfig,
    http: reqwest::Client,
}

impl HttpSource {
    /// Build the source; `username`/`password`/`token` may be empty.
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        token: impl Into<String>,
        config: HttpSourceConfig,
    ) -> ConnectorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ConnectorError::connection_failed_with_source("building client", e))?;
        Ok(Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            token: token.into(),
            config,
            http,
        })
    }

    /// Substitute `{group}` in the endpoint, or append a `group` query
    /// parameter when no placeholder is present.
    fn group_url(&self, group: &str) -> String {
        if self.endpoint.contains("{group}") {
            return self.endpoint.replace("{group}", group);
        }
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}group={}", self.endpoint, sep, group)
    }

    fn page_url(&self, group: &str, page: u64) -> String {
        let url = self.group_url(group);
        let sep = if url.contains('?') { '&' } else { '?' };
        format!("{}{}{}={}", url, sep, self.config.page_param(), page)
    }

    async fn get(&self, url: &str) -> ConnectorResult<reqwest::Response> {
        let mut request = self.http.get(url);
        if !self.username.is_empty() || !self.password.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }
        request
            .send()
            .await
            .map_err(|e| ConnectorError::request_failed_with_source("request failed", e))
    }

    async fn get_json(&self, url: &str) -> ConnectorResult<Value> {
        debug!(url, "fetching group members");
        let response = self.get(url).await?;
        if response.status() != StatusCode::OK {
            return Err(ConnectorError::UnexpectedStatus {
                status: response.status().as_u16(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| ConnectorError::InvalidResponse(e.to_string()))
    }

    fn extract_page(&self, payload: &Value) -> Vec<String> {
        let array = if self.config.results_field.is_empty() {
            payload
        } else {
            payload
                .get(&self.config.results_field)
                .unwrap_or(&Value::Null)
        };
        extract_ids(array, self.config.id_field())
    }

    async fn users_single(&self, group: &str) -> ConnectorResult<Vec<String>> {
        let payload = self.get_json(&self.group_url(group)).await?;
        if self.config.results_field.is_empty() {
            if !payload.is_array() {
                return Err(ConnectorError::InvalidResponse(
                    "expected an array body".to_string(),
                ));
            }
            return Ok(extract_ids(&payload, self.config.id_field()));
        }
        Ok(self.extract_page(&payload))
    }

    async fn users_paginated(&self, group: &str) -> ConnectorResult<Vec<String>> {
        let mut users = Vec::new();
        let mut page = 1u64;
        loop {
            let payload = self.get_json(&self.page_url(group, page)).await?;
            users.extend(self.extract_page(&payload));

            let total_pages = payload
                .get(self.config.total_pages_field())
                .and_then(Value::as_u64);
            match total_pages {
                // No pagination info: stop after the first page.
                None => return Ok(users),
                Some(total) if page >= total => return Ok(users),
                Some(_) => page += 1,
            }
        }
    }
}

/// Pull identifiers out of an array of strings or objects.
fn extract_ids(array: &Value, id_field: &str) -> Vec<String> {
    let Some(items) = array.as_array() else {
        return Vec::new();
    };
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => ids.push(s.clone()),
            Value::Object(obj) => {
                if let Some(Value::String(id)) = obj.get(id_field) {
                    ids.push(id.clone());
                }
            }
            _ => {}
        }
    }
    ids
}

#[async_trait]
impl MemberSource for HttpSource {
    async fn users(&self, group: &str) -> ConnectorResult<Vec<String>> {
        if self.config.paginated {
            self.users_paginated(group).await
        } else {
            self.users_single(group).await
        }
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        if self.config.test_connection_url.is_empty() {
            return Ok(());
        }
        let response = self.get(&self.config.test_connection_url).await?;
        let status = response.status();
        // Only credential rejections fail the probe; the probe URL may
        // legitimately 404 for a dummy group.
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConnectorError::AuthenticationFailed {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source(endpoint: &str) -> HttpSource {
        HttpSource::new(endpoint, "", "", "", HttpSourceConfig::default()).unwrap()
    }

    #[test]
    fn test_group_url_templating() {
        let templated = source("https://api.example.com/groups/{group}/members");
        assert_eq!(
            templated.group_url("eng"),
            "https://api.example.com/groups/eng/members"
        );

        let appended = source("https://api.example.com/members");
        assert_eq!(
            appended.group_url("eng"),
            "https://api.example.com/members?group=eng"
        );

        let with_query = source("https://api.example.com/members?v=2");
        assert_eq!(
            with_query.group_url("eng"),
            "https://api.example.com/members?v=2&group=eng"
        );
    }

    #[test]
    fn test_extract_ids_strings_and_objects() {
        let strings = json!(["U1", "U2"]);
        assert_eq!(extract_ids(&strings, "id"), vec!["U1", "U2"]);

        let objects = json!([{ "id": "U1" }, { "id": "U2" }, { "name": "no-id" }, 42]);
        assert_eq!(extract_ids(&objects, "id"), vec!["U1", "U2"]);

        let custom = json!([{ "userId": "U9" }]);
        assert_eq!(extract_ids(&custom, "userId"), vec!["U9"]);

        assert!(extract_ids(&json!({"not": "array"}), "id").is_empty());
    }
}
