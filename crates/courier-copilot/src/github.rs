//! Thin GitHub REST client: organizations, teams and Copilot seats.

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, LINK, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const PER_PAGE: &str = "100";
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub privacy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTeam {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<String>,
}

impl NewTeam {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            privacy: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid GitHub API URL: {0}")]
    InvalidUrl(String),
}

pub trait GithubApi: Send + Sync + 'static {
    fn list_organizations(&self) -> impl Future<Output = Result<Vec<Organization>, GithubError>> + Send;

    fn list_teams(&self, org: &str) -> impl Future<Output = Result<Vec<Team>, GithubError>> + Send;

    fn create_team(
        &self,
        org: &str,
        team: &NewTeam,
    ) -> impl Future<Output = Result<Team, GithubError>> + Send;

    /// Add `username` to the team and grant them a Copilot seat.
    fn send_copilot_invite(
        &self,
        org: &str,
        team_slug: &str,
        username: &str,
    ) -> impl Future<Output = Result<(), GithubError>> + Send;
}

#[derive(Clone)]
pub struct GithubClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl GithubClient {
    pub fn new(http: Client, base_url: &str, token: impl Into<String>) -> Result<Self, GithubError> {
        let base_url =
            Url::parse(base_url).map_err(|e| GithubError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GithubError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "courier")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GithubError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
        Err(GithubError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Follow `Link: rel="next"` until the last page.
    async fn get_all<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<Vec<T>, GithubError> {
        let mut url = self.url(segments);
        url.query_pairs_mut().append_pair("per_page", PER_PAGE);

        let mut items = Vec::new();
        let mut next = Some(url);
        while let Some(page) = next.take() {
            debug!(url = %page, "fetching GitHub page");
            let response = self.send(self.request(Method::GET, page)).await?;
            next = next_page(response.headers());
            items.extend(response.json::<Vec<T>>().await?);
        }
        Ok(items)
    }
}

impl GithubApi for GithubClient {
    async fn list_organizations(&self) -> Result<Vec<Organization>, GithubError> {
        self.get_all(&["user", "orgs"]).await
    }

    async fn list_teams(&self, org: &str) -> Result<Vec<Team>, GithubError> {
        self.get_all(&["orgs", org, "teams"]).await
    }

    async fn create_team(&self, org: &str, team: &NewTeam) -> Result<Team, GithubError> {
        let url = self.url(&["orgs", org, "teams"]);
        let response = self.send(self.request(Method::POST, url).json(team)).await?;
        let created: Team = response.json().await?;
        info!(org, team = %created.slug, "created GitHub team");
        Ok(created)
    }

    async fn send_copilot_invite(
        &self,
        org: &str,
        team_slug: &str,
        username: &str,
    ) -> Result<(), GithubError> {
        let membership = self.url(&["orgs", org, "teams", team_slug, "memberships", username]);
        self.send(
            self.request(Method::PUT, membership)
                .json(&serde_json::json!({ "role": "member" })),
        )
        .await?;

        let seats = self.url(&["orgs", org, "copilot", "billing", "selected_users"]);
        self.send(
            self.request(Method::POST, seats)
                .json(&serde_json::json!({ "selected_usernames": [username] })),
        )
        .await?;

        info!(org, team = %team_slug, username, "granted Copilot seat");
        Ok(())
    }
}

fn next_page(headers: &HeaderMap) -> Option<Url> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim().replace(' ', "") == "rel=\"next\"");
        if !is_next {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        Url::parse(target).ok()
    })
}
