//! Now deployment platform API.
//!
//! [`DeploymentPlatform`] is the port the orchestrator polls and aliases
//! through; [`NowClient`] implements it over the Now REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::redact::Redactor;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle state reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    Initializing,
    Analyzing,
    Building,
    Deploying,
    Ready,
    Error,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl DeploymentState {
    /// Whether the deployment can no longer become ready.
    pub fn is_failed(&self) -> bool {
        matches!(self, DeploymentState::Error | DeploymentState::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Initializing => "INITIALIZING",
            DeploymentState::Analyzing => "ANALYZING",
            DeploymentState::Building => "BUILDING",
            DeploymentState::Deploying => "DEPLOYING",
            DeploymentState::Ready => "READY",
            DeploymentState::Error => "ERROR",
            DeploymentState::Canceled => "CANCELED",
            DeploymentState::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deployment as seen by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    /// Host name without scheme, e.g. `app-abc123.now.sh`.
    pub url: String,
    #[serde(rename = "readyState", alias = "state")]
    pub state: DeploymentState,
}

/// Result of pointing an alias at a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasOutcome {
    Created,
    /// The alias already pointed at this deployment.
    AlreadyAssigned,
}

#[async_trait]
pub trait DeploymentPlatform: Send + Sync {
    /// Look a deployment up by its host name.
    async fn find_by_url(&self, host: &str) -> Result<Deployment>;

    async fn get(&self, id: &str) -> Result<Deployment>;

    async fn create_alias(&self, id: &str, alias: &str) -> Result<AliasOutcome>;
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Extract `(code, message)` from an API error body with secrets redacted.
///
/// JSON bodies are redacted structurally before the fields are read; any
/// other body is kept as trimmed text.
fn parse_api_error(body: &str, redactor: &Redactor) -> (Option<String>, String) {
    let value = match serde_json::from_str::<Value>(body) {
        Ok(value) => redactor.redact_json(&value),
        Err(_) => return (None, redactor.redact_str(body.trim())),
    };
    match serde_json::from_value::<ApiErrorBody>(value.clone()) {
        Ok(parsed) => {
            let message = parsed
                .error
                .message
                .or_else(|| parsed.error.code.clone())
                .unwrap_or_else(|| value.to_string());
            (parsed.error.code, message)
        }
        Err(_) => (None, value.to_string()),
    }
}

fn parse_deployment(body: &str) -> Result<Deployment> {
    Ok(serde_json::from_str(body)?)
}

/// Query parameter scoping requests to a team. Team ids look like
/// `team_...`; anything else is the team slug the CLI also accepts.
fn team_param(team: &str) -> (&'static str, &str) {
    if team.starts_with("team_") {
        ("teamId", team)
    } else {
        ("slug", team)
    }
}

/// Interpret the response to an alias request.
fn alias_outcome(status: StatusCode, body: &str, redactor: &Redactor) -> Result<AliasOutcome> {
    if status.is_success() {
        return Ok(AliasOutcome::Created);
    }
    if status == StatusCode::CONFLICT {
        return Ok(AliasOutcome::AlreadyAssigned);
    }
    let (code, message) = parse_api_error(body, redactor);
    if code.as_deref() == Some("not_modified") {
        return Ok(AliasOutcome::AlreadyAssigned);
    }
    Err(DeployError::Platform {
        status: status.as_u16(),
        message,
    })
}

/// Now REST API client.
pub struct NowClient {
    base_url: String,
    token: String,
    team: Option<String>,
    http: reqwest::Client,
    redactor: Redactor,
}

impl NowClient {
    pub fn new(config: &DeployConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("nowci/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(NowClient {
            base_url: config.now_api_url.clone(),
            token: config.now_token.clone(),
            team: config.team.clone(),
            http,
            redactor: config.redactor(),
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.bearer_auth(&self.token);
        match &self.team {
            Some(team) => builder.query(&[team_param(team)]),
            None => builder,
        }
    }

    async fn error_from(&self, response: Response) -> DeployError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let (_, message) = parse_api_error(&body, &self.redactor);
        DeployError::Platform { status, message }
    }

    async fn deployment_from(&self, response: Response) -> Result<Deployment> {
        if !response.status().is_success() {
            return Err(self.error_from(response).await);
        }
        let body = response.text().await?;
        parse_deployment(&body)
    }
}

#[async_trait]
impl DeploymentPlatform for NowClient {
    async fn find_by_url(&self, host: &str) -> Result<Deployment> {
        let url = format!("{}/v11/now/deployments/get", self.base_url);
        debug!(host = %host, "Looking up deployment by URL");
        let response = self
            .request(self.http.get(&url))
            .query(&[("url", host)])
            .send()
            .await?;
        self.deployment_from(response).await
    }

    async fn get(&self, id: &str) -> Result<Deployment> {
        let url = format!("{}/v11/now/deployments/{}", self.base_url, id);
        let response = self.request(self.http.get(&url)).send().await?;
        self.deployment_from(response).await
    }

    async fn create_alias(&self, id: &str, alias: &str) -> Result<AliasOutcome> {
        let url = format!("{}/v2/now/deployments/{}/aliases", self.base_url, id);
        let response = self
            .request(self.http.post(&url))
            .json(&serde_json::json!({ "alias": alias }))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        alias_outcome(status, &body, &self.redactor)
    }
}
