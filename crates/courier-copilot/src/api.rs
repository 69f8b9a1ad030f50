//! The `copilot-api` processor: routes relayed `/api/v1/*` requests to GitHub
//! and the license mirror.

use crate::github::{GithubApi, GithubError, NewTeam};
use crate::licenses::{LicenseError, LicenseMirror, LicenseSource};
use async_trait::async_trait;
use bytes::Bytes;
use courier_bridge::{ProcessContext, Processor, ProcessorError, ProcessorResponse};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    Health,
    Organizations,
    Teams(&'a str),
    Invite,
}

impl Route<'_> {
    fn allowed(&self) -> &'static [&'static str] {
        match self {
            Route::Health | Route::Organizations => &["GET"],
            Route::Teams(_) => &["GET", "POST"],
            Route::Invite => &["POST"],
        }
    }
}

fn route(path: &str) -> Option<Route<'_>> {
    let path = path.split('?').next().unwrap_or_default();
    let path = path.strip_prefix(API_PREFIX).unwrap_or(path);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["healthcheck"] => Some(Route::Health),
        ["orgs"] => Some(Route::Organizations),
        ["orgs", org, "teams"] => Some(Route::Teams(org)),
        ["copilot", "invite"] => Some(Route::Invite),
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize)]
struct InviteRequest {
    #[serde(default)]
    organization: String,
    #[serde(default)]
    team: String,
    #[serde(default)]
    username: String,
}

pub struct CopilotApi<G, S> {
    github: G,
    licenses: Arc<LicenseMirror<S>>,
}

impl<G: GithubApi, S: LicenseSource> CopilotApi<G, S> {
    pub fn new(github: G, licenses: Arc<LicenseMirror<S>>) -> Self {
        Self { github, licenses }
    }

    pub fn licenses(&self) -> &Arc<LicenseMirror<S>> {
        &self.licenses
    }

    async fn list_organizations(&self) -> Result<ProcessorResponse, ProcessorError> {
        match self.github.list_organizations().await {
            Ok(orgs) => ProcessorResponse::json(200, &orgs),
            Err(e) => github_failure("failed to list organizations", &e),
        }
    }

    async fn list_teams(&self, org: &str) -> Result<ProcessorResponse, ProcessorError> {
        match self.github.list_teams(org).await {
            Ok(teams) => ProcessorResponse::json(200, &teams),
            Err(e) => github_failure("failed to list teams", &e),
        }
    }

    async fn create_team(&self, org: &str, body: &[u8]) -> Result<ProcessorResponse, ProcessorError> {
        let team: NewTeam = match serde_json::from_slice(body) {
            Ok(team) => team,
            Err(e) => return invalid_body(&e),
        };
        if team.name.trim().is_empty() {
            return error(400, "team name is required");
        }
        match self.github.create_team(org, &team).await {
            Ok(created) => ProcessorResponse::json(201, &created),
            Err(e) => github_failure("failed to create team", &e),
        }
    }

    async fn invite(&self, ctx: &ProcessContext, body: &[u8]) -> Result<ProcessorResponse, ProcessorError> {
        let request: InviteRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => return invalid_body(&e),
        };
        if request.organization.is_empty() || request.team.is_empty() || request.username.is_empty() {
            return error(400, "organization, team and username are required");
        }
        let org = request.organization.as_str();

        let teams = match self.github.list_teams(org).await {
            Ok(teams) => teams,
            Err(e) => return github_failure("failed to list teams", &e),
        };
        let slug = match teams.into_iter().find(|t| t.name == request.team) {
            Some(team) => team.slug,
            None => match self.github.create_team(org, &NewTeam::named(&request.team)).await {
                Ok(created) => {
                    info!(org, team = %request.team, "created team for invite");
                    created.slug
                }
                Err(e) => return github_failure("failed to create team", &e),
            },
        };

        match self.licenses.check_availability(org).await {
            Ok(true) => {}
            Ok(false) => return error(409, "no licenses available for this organization"),
            Err(e) => {
                warn!(org, error = %e, "license availability check failed");
                return error(500, "failed to check license availability");
            }
        }

        let remaining = match self.licenses.decrement(org).await {
            Ok(remaining) => remaining,
            Err(LicenseError::NoLicenseAvailable(_)) => {
                return error(409, "no licenses available for this organization");
            }
            Err(e) => {
                warn!(org, error = %e, "license reservation failed");
                return error(500, "failed to update license count");
            }
        };

        if let Err(e) = self
            .github
            .send_copilot_invite(org, &slug, &request.username)
            .await
        {
            self.licenses.restore(org).await;
            return github_failure("failed to send invite", &e);
        }

        info!(
            correlation_id = %ctx.correlation_id,
            org,
            team = %slug,
            username = %request.username,
            remaining,
            "invite sent"
        );
        ProcessorResponse::json(200, &json!({ "message": "invite sent successfully" }))
    }
}

#[async_trait]
impl<G: GithubApi, S: LicenseSource> Processor for CopilotApi<G, S> {
    async fn process(
        &self,
        ctx: &ProcessContext,
        body: Bytes,
    ) -> Result<ProcessorResponse, ProcessorError> {
        let Some(route) = route(&ctx.path) else {
            return error(404, "not found");
        };
        let method = ctx.method.to_ascii_uppercase();
        if !route.allowed().contains(&method.as_str()) {
            return Ok(error(405, "method not allowed")?.with_header("allow", route.allowed().join(", ")));
        }

        match (method.as_str(), route) {
            (_, Route::Health) => ProcessorResponse::json(200, &json!({ "status": "healthy" })),
            (_, Route::Organizations) => self.list_organizations().await,
            ("POST", Route::Teams(org)) => self.create_team(org, &body).await,
            (_, Route::Teams(org)) => self.list_teams(org).await,
            (_, Route::Invite) => self.invite(ctx, &body).await,
        }
    }
}

fn error(status: u16, message: &str) -> Result<ProcessorResponse, ProcessorError> {
    ProcessorResponse::json(status, &json!({ "error": message }))
}

fn github_failure(context: &str, e: &GithubError) -> Result<ProcessorResponse, ProcessorError> {
    warn!(error = %e, "{context}");
    error(502, &format!("{context}: {e}"))
}

fn invalid_body(e: &serde_json::Error) -> Result<ProcessorResponse, ProcessorError> {
    error(400, &format!("invalid request body: {e}"))
}
