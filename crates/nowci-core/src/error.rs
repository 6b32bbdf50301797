//! Error taxonomy for nowci.

/// Errors produced while configuring or running a deployment.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Required environment variable unset or empty
    #[error("missing required environment variable: {variable}")]
    MissingConfiguration { variable: String },

    /// Environment variable set to an unusable value
    #[error("invalid value for {variable}: {reason}")]
    InvalidConfiguration { variable: String, reason: String },

    /// Not running under Travis CI or CircleCI
    #[error("no supported CI provider detected (expected Travis CI or CircleCI)")]
    NoProviderDetected,

    /// Deployment CLI could not be started
    #[error("failed to launch {program}: {source}")]
    SubprocessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Deployment CLI wrote to stderr
    #[error("deployment command wrote to stderr: {0}")]
    SubprocessOutput(String),

    /// Deployment CLI output carried no URL
    #[error("no deployment URL found in deployment command output")]
    MissingDeploymentUrl,

    /// Deployment did not become ready in time
    #[error("deployment {url} was not ready after {timeout_secs}s")]
    DeploymentTimeout { url: String, timeout_secs: u64 },

    /// Platform reported an error or canceled state
    #[error("deployment {url} ended in state {state}")]
    DeploymentFailed { url: String, state: String },

    /// Non-success HTTP response from the Now or GitHub API
    #[error("platform request failed with status {status}: {message}")]
    Platform { status: u16, message: String },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(String),

    /// Malformed JSON response
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for DeployError {
    fn from(err: reqwest::Error) -> Self {
        DeployError::Http(err.to_string())
    }
}

impl DeployError {
    pub(crate) fn missing(variable: &str) -> Self {
        DeployError::MissingConfiguration {
            variable: variable.to_string(),
        }
    }

    pub(crate) fn invalid(variable: &str, reason: impl Into<String>) -> Self {
        DeployError::InvalidConfiguration {
            variable: variable.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for nowci operations.
pub type Result<T> = std::result::Result<T, DeployError>;
