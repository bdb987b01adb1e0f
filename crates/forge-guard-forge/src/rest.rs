//! REST v3 + GraphQL implementation of [`ForgeApi`].

use async_trait::async_trait;
use reqwest::{header, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use forge_guard_core::operations::Permission;
use forge_guard_core::organization::{Repository, TeamWithPermission};

use crate::api::{ForgeAccount, ForgeApi, RepositoryListing};
use crate::auth::{AppAuth, AppCredentials};
use crate::error::{ForgeError, ForgeResult};
use crate::slug::team_slug;

const PAGE_SIZE: usize = 100;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const ACCEPT_JSON: &str = "application/vnd.github+json";
const TEAM_DESCRIPTION: &str = "membership to this team is managed by forge-guard";

#[derive(Debug, Deserialize)]
struct TeamRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    permission: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    #[serde(default)]
    login: Option<String>,
    #[serde(default)]
    id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RepoRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    private: bool,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<GraphQlData>,
    #[serde(default)]
    errors: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlData {
    #[serde(default)]
    user: Option<GraphQlUser>,
}

#[derive(Debug, Deserialize)]
struct GraphQlUser {
    #[serde(rename = "organizationVerifiedDomainEmails", default)]
    emails: Vec<String>,
}

/// Production forge client over REST v3 and GraphQL v4.
pub struct RestForgeClient {
    auth: AppAuth,
    http: reqwest::Client,
    api_url: String,
    graphql_url: String,
}

impl RestForgeClient {
    /// Build a client for one forge endpoint.
    ///
    /// The GraphQL URL is derived from the v3 API URL (`/graphql` next to
    /// the versioned REST root) unless overridden.
    pub fn new(
        v3_api_url: &str,
        graphql_url: Option<&str>,
        integration_id: i64,
        credentials: &AppCredentials,
        user_agent: &str,
    ) -> ForgeResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS));
        if !user_agent.is_empty() {
            builder = builder.user_agent(user_agent.to_string());
        }
        let http = builder.build()?;

        let api_url = v3_api_url.trim_end_matches('/').to_string();
        let graphql_url = graphql_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| derive_graphql_url(&api_url));
        let auth = AppAuth::new(api_url.clone(), integration_id, credentials, http.clone())?;

        Ok(Self {
            auth,
            http,
            api_url,
            graphql_url,
        })
    }

    async fn request(
        &self,
        installation: i64,
        method: Method,
        path: &str,
    ) -> ForgeResult<reqwest::RequestBuilder> {
        let token = self.auth.installation_token(installation).await?;
        Ok(self
            .http
            .request(method, format!("{}{}", self.api_url, path))
            .bearer_auth(token)
            .header(header::ACCEPT, ACCEPT_JSON))
    }

    /// Fetch all pages of a list endpoint, 100 items at a time.
    async fn get_paged<R: for<'de> Deserialize<'de>>(
        &self,
        installation: i64,
        path: &str,
        extra_query: &[(&str, &str)],
    ) -> ForgeResult<Vec<R>> {
        let mut items: Vec<R> = Vec::new();
        let mut page = 1usize;
        loop {
            let per_page = PAGE_SIZE.to_string();
            let page_str = page.to_string();
            let request = self
                .request(installation, Method::GET, path)
                .await?
                .query(extra_query)
                .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())]);
            let response = request.send().await?;
            let response = expect_success(response).await?;
            let batch: Vec<R> = response
                .json()
                .await
                .map_err(|e| ForgeError::Decode(e.to_string()))?;
            let batch_len = batch.len();
            items.extend(batch);
            if batch_len < PAGE_SIZE {
                return Ok(items);
            }
            page += 1;
        }
    }

    async fn repository_teams(
        &self,
        installation: i64,
        org: &str,
        repo: &str,
    ) -> ForgeResult<Vec<TeamWithPermission>> {
        let records: Vec<TeamRecord> = self
            .get_paged(installation, &format!("/repos/{org}/{repo}/teams"), &[])
            .await?;

        let mut teams = Vec::with_capacity(records.len());
        for record in records {
            let Some(name) = record.name.filter(|n| !n.is_empty()) else {
                continue;
            };
            let Some(raw) = record.permission else {
                continue;
            };
            match raw.parse::<Permission>() {
                Ok(permission) => teams.push(TeamWithPermission::new(name, permission)),
                Err(_) => {
                    // Permissions outside the managed set (e.g. maintain)
                    // are not reconciled.
                    debug!(repo, team = %name, permission = %raw, "ignoring unmanaged permission");
                }
            }
        }
        Ok(teams)
    }

    async fn edit_org_membership(
        &self,
        installation: i64,
        org: &str,
        login: &str,
        role: &str,
    ) -> ForgeResult<()> {
        let response = self
            .request(
                installation,
                Method::PUT,
                &format!("/orgs/{org}/memberships/{login}"),
            )
            .await?
            .json(&json!({ "role": role }))
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }
}

fn derive_graphql_url(api_url: &str) -> String {
    // `https://host/api/v3` → `https://host/api/graphql`; a bare REST root
    // gets `/graphql` appended.
    match api_url.strip_suffix("/v3") {
        Some(base) => format!("{base}/graphql"),
        None => format!("{api_url}/graphql"),
    }
}

async fn expect_success(response: reqwest::Response) -> ForgeResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ForgeError::api(status.as_u16(), body))
}

#[async_trait]
impl ForgeApi for RestForgeClient {
    async fn check_app(&self) -> ForgeResult<()> {
        let jwt = self.auth.app_jwt()?;
        let response = self
            .http
            .get(format!("{}/app", self.api_url))
            .bearer_auth(jwt)
            .header(header::ACCEPT, ACCEPT_JSON)
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn list_teams(&self, installation: i64, org: &str) -> ForgeResult<Vec<String>> {
        let records: Vec<TeamRecord> = self
            .get_paged(installation, &format!("/orgs/{org}/teams"), &[])
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|t| t.name.filter(|n| !n.is_empty()))
            .collect())
    }

    async fn team_members(
        &self,
        installation: i64,
        org: &str,
        team: &str,
    ) -> ForgeResult<Vec<ForgeAccount>> {
        let slug = team_slug(team);
        let records: Vec<UserRecord> = self
            .get_paged(
                installation,
                &format!("/orgs/{org}/teams/{slug}/members"),
                &[],
            )
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|u| match (u.login, u.id) {
                (Some(login), Some(id)) if !login.is_empty() => Some(ForgeAccount::new(login, id)),
                _ => None,
            })
            .collect())
    }

    async fn create_team(&self, installation: i64, org: &str, team: &str) -> ForgeResult<()> {
        let response = self
            .request(installation, Method::POST, &format!("/orgs/{org}/teams"))
            .await?
            .json(&json!({
                "name": team,
                "privacy": "closed",
                "description": TEAM_DESCRIPTION,
            }))
            .send()
            .await?;

        // Name collisions mean the team already exists.
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            warn!(org, team, "team already exists on forge");
            return Ok(());
        }
        expect_success(response).await?;
        Ok(())
    }

    async fn delete_team(&self, installation: i64, org: &str, team: &str) -> ForgeResult<()> {
        let slug = team_slug(team);
        let response = self
            .request(
                installation,
                Method::DELETE,
                &format!("/orgs/{org}/teams/{slug}"),
            )
            .await?
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn add_team_member(
        &self,
        installation: i64,
        org: &str,
        team: &str,
        login: &str,
    ) -> ForgeResult<()> {
        let slug = team_slug(team);
        let response = self
            .request(
                installation,
                Method::PUT,
                &format!("/orgs/{org}/teams/{slug}/memberships/{login}"),
            )
            .await?
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ForgeError::MemberNotFound);
        }
        expect_success(response).await?;
        Ok(())
    }

    async fn remove_team_member(
        &self,
        installation: i64,
        org: &str,
        team: &str,
        login: &str,
    ) -> ForgeResult<()> {
        let slug = team_slug(team);
        let response = self
            .request(
                installation,
                Method::DELETE,
                &format!("/orgs/{org}/teams/{slug}/memberships/{login}"),
            )
            .await?
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn organization_owners(
        &self,
        installation: i64,
        org: &str,
    ) -> ForgeResult<Vec<ForgeAccount>> {
        let records: Vec<UserRecord> = self
            .get_paged(
                installation,
                &format!("/orgs/{org}/members"),
                &[("role", "admin")],
            )
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|u| match (u.login, u.id) {
                (Some(login), Some(id)) if !login.is_empty() => Some(ForgeAccount::new(login, id)),
                _ => None,
            })
            .collect())
    }

    async fn promote_to_owner(
        &self,
        installation: i64,
        org: &str,
        login: &str,
    ) -> ForgeResult<()> {
        self.edit_org_membership(installation, org, login, "admin")
            .await
    }

    async fn demote_to_member(
        &self,
        installation: i64,
        org: &str,
        login: &str,
    ) -> ForgeResult<()> {
        self.edit_org_membership(installation, org, login, "member")
            .await
    }

    async fn list_repositories(
        &self,
        installation: i64,
        org: &str,
    ) -> ForgeResult<RepositoryListing> {
        let records: Vec<RepoRecord> = self
            .get_paged(installation, &format!("/orgs/{org}/repos"), &[])
            .await?;

        let mut listing = RepositoryListing::default();
        for record in records {
            let Some(name) = record.name.filter(|n| !n.is_empty()) else {
                continue;
            };
            let teams = self.repository_teams(installation, org, &name).await?;
            let repository = Repository { name, teams };
            if record.private {
                listing.private.push(repository);
            } else {
                listing.public.push(repository);
            }
        }
        Ok(listing)
    }

    async fn add_repository_team(
        &self,
        installation: i64,
        org: &str,
        repo: &str,
        team: &str,
        permission: Permission,
    ) -> ForgeResult<()> {
        let slug = team_slug(team);
        let response = self
            .request(
                installation,
                Method::PUT,
                &format!("/orgs/{org}/teams/{slug}/repos/{org}/{repo}"),
            )
            .await?
            .json(&json!({ "permission": permission.as_str() }))
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn remove_repository_team(
        &self,
        installation: i64,
        org: &str,
        repo: &str,
        team: &str,
    ) -> ForgeResult<()> {
        let slug = team_slug(team);
        let response = self
            .request(
                installation,
                Method::DELETE,
                &format!("/orgs/{org}/teams/{slug}/repos/{org}/{repo}"),
            )
            .await?
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn login_by_user_id(
        &self,
        installation: i64,
        user_id: i64,
    ) -> ForgeResult<Option<String>> {
        let response = self
            .request(installation, Method::GET, &format!("/user/{user_id}"))
            .await?
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let record: UserRecord = expect_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ForgeError::Decode(e.to_string()))?;
        Ok(record.login.filter(|l| !l.is_empty()))
    }

    async fn user_id_by_login(
        &self,
        installation: i64,
        login: &str,
    ) -> ForgeResult<Option<i64>> {
        let response = self
            .request(installation, Method::GET, &format!("/users/{login}"))
            .await?
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let record: UserRecord = expect_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ForgeError::Decode(e.to_string()))?;
        Ok(record.id)
    }

    async fn verified_domain_email(
        &self,
        installation: i64,
        org: &str,
        user_id: &str,
        domain: &str,
    ) -> ForgeResult<bool> {
        if domain.is_empty() {
            return Ok(false);
        }
        let numeric: i64 = user_id
            .parse()
            .map_err(|_| ForgeError::Decode(format!("invalid forge user id '{user_id}'")))?;
        let Some(login) = self.login_by_user_id(installation, numeric).await? else {
            return Ok(false);
        };

        let token = self.auth.installation_token(installation).await?;
        let query = "query($login: String!, $org: String!) { \
             user(login: $login) { organizationVerifiedDomainEmails(login: $org) } }";
        let response = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(token)
            .json(&json!({
                "query": query,
                "variables": { "login": login, "org": org },
            }))
            .send()
            .await?;
        let parsed: GraphQlResponse = expect_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ForgeError::Decode(e.to_string()))?;

        if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
            return Err(ForgeError::Decode(format!(
                "graphql errors: {}",
                serde_json::Value::Array(errors)
            )));
        }

        let emails = parsed
            .data
            .and_then(|d| d.user)
            .map(|u| u.emails)
            .unwrap_or_default();
        Ok(emails.iter().any(|email| {
            email
                .rsplit_once('@')
                .map(|(_, d)| d.eq_ignore_ascii_case(domain))
                .unwrap_or(false)
        }))
    }
}
