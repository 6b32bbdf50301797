//! Commit status reporting.
//!
//! Status posts are fire-and-forget. [`StatusNotifier`] queues updates on a
//! channel drained by a single background task, so the orchestrator never
//! waits on the network while delivery order still matches issue order.
//! Delivery failures are logged and otherwise ignored.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::obs;
use crate::redact::Redactor;

/// GitHub rejects longer descriptions.
const MAX_DESCRIPTION_CHARS: usize = 140;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Pending,
    Success,
    Error,
}

impl StatusState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusState::Pending => "pending",
            StatusState::Success => "success",
            StatusState::Error => "error",
        }
    }
}

/// A commit status to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub state: StatusState,
    pub description: String,
    pub target_url: String,
    pub context: String,
}

impl StatusUpdate {
    pub fn new(
        state: StatusState,
        description: impl Into<String>,
        target_url: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            state,
            description: truncate(description.into(), MAX_DESCRIPTION_CHARS),
            target_url: target_url.into(),
            context: context.into(),
        }
    }
}

fn truncate(mut text: String, max_chars: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
    }
    text
}

/// Destination for commit statuses.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn post(&self, update: &StatusUpdate) -> Result<()>;
}

/// Posts statuses to the GitHub commit status API.
pub struct GithubStatusClient {
    endpoint: String,
    token: String,
    http: reqwest::Client,
    redactor: Redactor,
}

impl GithubStatusClient {
    /// Client posting to `repository` (`owner/repo`) at commit `sha`.
    pub fn new(config: &DeployConfig, repository: &str, sha: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("nowci/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(GithubStatusClient {
            endpoint: format!(
                "{}/repos/{}/statuses/{}",
                config.github_api_url, repository, sha
            ),
            token: config.github_token.clone(),
            http,
            redactor: config.redactor(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StatusSink for GithubStatusClient {
    async fn post(&self, update: &StatusUpdate) -> Result<()> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("token {}", self.token))
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
            .json(update)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeployError::Platform {
            status: status.as_u16(),
            message: error_message(&body, &self.redactor),
        })
    }
}

/// Redacted `message` of a GitHub error body, or the whole redacted body.
fn error_message(body: &str, redactor: &Redactor) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => {
            let value = redactor.redact_json(&value);
            match value.get("message").and_then(serde_json::Value::as_str) {
                Some(message) => message.to_string(),
                None => value.to_string(),
            }
        }
        Err(_) => redactor.redact_str(body.trim()),
    }
}

/// Non-blocking, ordered front for a [`StatusSink`].
pub struct StatusNotifier {
    tx: mpsc::UnboundedSender<StatusUpdate>,
    worker: JoinHandle<()>,
}

impl StatusNotifier {
    /// Start the delivery task. Must be called inside a tokio runtime.
    pub fn spawn(sink: Arc<dyn StatusSink>, redactor: Redactor) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<StatusUpdate>();
        let worker = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                match sink.post(&update).await {
                    Ok(()) => obs::emit_status_posted(update.state.as_str(), &update.target_url),
                    Err(e) => obs::emit_status_failed(
                        update.state.as_str(),
                        &redactor.redact_str(&e.to_string()),
                    ),
                }
            }
        });
        Self { tx, worker }
    }

    /// Queue an update. Never waits on delivery.
    pub fn notify(&self, update: StatusUpdate) {
        if self.tx.send(update).is_err() {
            warn!("Status worker has stopped; dropping status update");
        }
    }

    /// Deliver everything queued so far, then stop the worker.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "Status worker terminated abnormally");
        }
    }
}
