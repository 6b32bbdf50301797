//! Environment snapshot and deployment configuration.
//!
//! The process environment is captured once into an [`Env`] at startup and
//! every other component reads from that snapshot. Tests build an `Env` from
//! pairs instead of mutating the real environment.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DeployError, Result};
use crate::redact::Redactor;

pub const DEFAULT_NOW_CLI: &str = "now";
pub const DEFAULT_NOW_API_URL: &str = "https://api.zeit.co";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_STATUS_CONTEXT: &str = "deploy/now";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 600;

/// Required deployment variables, in the order they are checked.
pub const REQUIRED_VARS: [&str; 5] = [
    "NOW_DEPLOY_ROOT",
    "NOW_TOKEN",
    "GITHUB_TOKEN",
    "NOW_NAME",
    "NOW_ALIAS",
];

/// Immutable snapshot of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    vars: BTreeMap<String, String>,
}

impl Env {
    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a snapshot from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Return a copy with one variable set.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Return a copy with one variable removed.
    pub fn without(mut self, key: &str) -> Self {
        self.vars.remove(key);
        self
    }

    /// Value of a variable; empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Value of a required variable.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| DeployError::missing(key))
    }

    /// Whether `key` is set to exactly `expected`.
    pub fn is(&self, key: &str, expected: &str) -> bool {
        self.get(key) == Some(expected)
    }

    /// Parse an optional boolean flag, `default` when unset.
    pub fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => parse_bool(raw).ok_or_else(|| {
                DeployError::invalid(key, format!("expected a boolean, got {raw:?}"))
            }),
        }
    }

    /// Parse an optional number of seconds, `default` when unset.
    pub fn seconds(&self, key: &str, default: u64) -> Result<u64> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                DeployError::invalid(key, format!("expected a number of seconds, got {raw:?}"))
            }),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Credentials injected into the deployment as basic-auth environment.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

const MASK: &str = "***";

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &MASK)
            .finish()
    }
}

/// Interval and overall bound for readiness polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS),
        }
    }
}

impl PollSettings {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Deployment configuration, built once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct DeployConfig {
    /// Directory uploaded by the deployment CLI.
    pub root_dir: PathBuf,
    pub now_token: String,
    pub github_token: String,
    /// Deployment name passed to the CLI.
    pub name: String,
    /// Production alias.
    pub alias: String,
    pub public: bool,
    pub static_site: bool,
    pub team: Option<String>,
    pub basic_auth: Option<BasicAuth>,
    /// Deployment CLI executable.
    pub now_cli: String,
    pub now_api_url: String,
    pub github_api_url: String,
    /// Context label of the commit status.
    pub status_context: String,
    pub poll: PollSettings,
}

impl DeployConfig {
    /// Load configuration from an environment snapshot.
    ///
    /// Required variables are checked in [`REQUIRED_VARS`] order and the first
    /// missing one is reported.
    pub fn from_env(env: &Env) -> Result<Self> {
        for var in REQUIRED_VARS {
            env.require(var)?;
        }

        let basic_auth = match (
            env.get("NOW_BASIC_AUTH_USERNAME"),
            env.get("NOW_BASIC_AUTH_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(BasicAuth {
                username: username.to_string(),
                password: password.to_string(),
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(DeployError::invalid(
                    "NOW_BASIC_AUTH_PASSWORD",
                    "must be set together with NOW_BASIC_AUTH_USERNAME",
                ))
            }
            (None, Some(_)) => {
                return Err(DeployError::invalid(
                    "NOW_BASIC_AUTH_USERNAME",
                    "must be set together with NOW_BASIC_AUTH_PASSWORD",
                ))
            }
        };

        let interval = env.seconds("NOWCI_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if interval == 0 {
            return Err(DeployError::invalid(
                "NOWCI_POLL_INTERVAL_SECS",
                "must be greater than zero",
            ));
        }
        let timeout = env.seconds("NOWCI_READY_TIMEOUT_SECS", DEFAULT_READY_TIMEOUT_SECS)?;

        Ok(Self {
            root_dir: PathBuf::from(env.require("NOW_DEPLOY_ROOT")?),
            now_token: env.require("NOW_TOKEN")?.to_string(),
            github_token: env.require("GITHUB_TOKEN")?.to_string(),
            name: env.require("NOW_NAME")?.to_string(),
            alias: env.require("NOW_ALIAS")?.to_string(),
            public: env.flag("NOW_PUBLIC", false)?,
            static_site: env.flag("NOW_STATIC", false)?,
            team: env.get("NOW_TEAM").map(str::to_string),
            basic_auth,
            now_cli: env.get("NOW_CLI").unwrap_or(DEFAULT_NOW_CLI).to_string(),
            now_api_url: trim_base(env.get("NOW_API_URL").unwrap_or(DEFAULT_NOW_API_URL)),
            github_api_url: trim_base(env.get("GITHUB_API_URL").unwrap_or(DEFAULT_GITHUB_API_URL)),
            status_context: env
                .get("NOWCI_STATUS_CONTEXT")
                .unwrap_or(DEFAULT_STATUS_CONTEXT)
                .to_string(),
            poll: PollSettings::new(Duration::from_secs(interval), Duration::from_secs(timeout)),
        })
    }

    /// Override the poll settings.
    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Redactor covering every secret in this configuration.
    pub fn redactor(&self) -> Redactor {
        let mut redactor = Redactor::new()
            .with_secret(&self.now_token, "[NOW_TOKEN]")
            .with_secret(&self.github_token, "[GITHUB_TOKEN]");
        if let Some(auth) = &self.basic_auth {
            redactor = redactor.with_secret(&auth.password, "[BASIC_AUTH_PASSWORD]");
        }
        redactor
    }
}

// Tokens never appear in debug output.
impl fmt::Debug for DeployConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployConfig")
            .field("root_dir", &self.root_dir)
            .field("now_token", &MASK)
            .field("github_token", &MASK)
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("public", &self.public)
            .field("static_site", &self.static_site)
            .field("team", &self.team)
            .field("basic_auth", &self.basic_auth)
            .field("now_cli", &self.now_cli)
            .field("now_api_url", &self.now_api_url)
            .field("github_api_url", &self.github_api_url)
            .field("status_context", &self.status_context)
            .field("poll", &self.poll)
            .finish()
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_env() -> Env {
        Env::from_pairs([
            ("NOW_DEPLOY_ROOT", "dist"),
            ("NOW_TOKEN", "now-secret"),
            ("GITHUB_TOKEN", "gh-secret"),
            ("NOW_NAME", "example-app"),
            ("NOW_ALIAS", "example.com"),
        ])
    }

    #[test]
    fn loads_required_values_and_defaults() {
        let config = DeployConfig::from_env(&base_env()).expect("config");
        assert_eq!(config.root_dir, PathBuf::from("dist"));
        assert_eq!(config.name, "example-app");
        assert_eq!(config.alias, "example.com");
        assert!(!config.public);
        assert!(!config.static_site);
        assert!(config.team.is_none());
        assert!(config.basic_auth.is_none());
        assert_eq!(config.now_cli, DEFAULT_NOW_CLI);
        assert_eq!(config.now_api_url, DEFAULT_NOW_API_URL);
        assert_eq!(config.status_context, DEFAULT_STATUS_CONTEXT);
        assert_eq!(config.poll, PollSettings::default());
    }

    #[test]
    fn reports_first_missing_variable_in_order() {
        let env = base_env().without("GITHUB_TOKEN").without("NOW_ALIAS");
        match DeployConfig::from_env(&env) {
            Err(DeployError::MissingConfiguration { variable }) => {
                assert_eq!(variable, "GITHUB_TOKEN")
            }
            other => panic!("expected missing configuration, got {other:?}"),
        }

        match DeployConfig::from_env(&Env::default()) {
            Err(DeployError::MissingConfiguration { variable }) => {
                assert_eq!(variable, "NOW_DEPLOY_ROOT")
            }
            other => panic!("expected missing configuration, got {other:?}"),
        }
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let env = base_env().with("NOW_NAME", "");
        assert!(matches!(
            DeployConfig::from_env(&env),
            Err(DeployError::MissingConfiguration { variable }) if variable == "NOW_NAME"
        ));
    }

    #[test]
    fn parses_optional_flags() {
        let env = base_env()
            .with("NOW_PUBLIC", "TRUE")
            .with("NOW_STATIC", "1")
            .with("NOW_TEAM", "acme")
            .with("NOW_API_URL", "http://localhost:9000/")
            .with("NOWCI_POLL_INTERVAL_SECS", "2")
            .with("NOWCI_READY_TIMEOUT_SECS", "30");
        let config = DeployConfig::from_env(&env).unwrap();
        assert!(config.public);
        assert!(config.static_site);
        assert_eq!(config.team.as_deref(), Some("acme"));
        assert_eq!(config.now_api_url, "http://localhost:9000");
        assert_eq!(config.poll.interval, Duration::from_secs(2));
        assert_eq!(config.poll.timeout, Duration::from_secs(30));
    }

    #[test]
    fn rejects_malformed_boolean() {
        let env = base_env().with("NOW_PUBLIC", "maybe");
        assert!(matches!(
            DeployConfig::from_env(&env),
            Err(DeployError::InvalidConfiguration { variable, .. }) if variable == "NOW_PUBLIC"
        ));
    }

    #[test]
    fn basic_auth_requires_both_halves() {
        let env = base_env().with("NOW_BASIC_AUTH_USERNAME", "admin");
        assert!(matches!(
            DeployConfig::from_env(&env),
            Err(DeployError::InvalidConfiguration { .. })
        ));

        let env = env.with("NOW_BASIC_AUTH_PASSWORD", "hunter2");
        let auth = DeployConfig::from_env(&env).unwrap().basic_auth.unwrap();
        assert_eq!(auth.username, "admin");
        assert_eq!(auth.password, "hunter2");
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let env = base_env().with("NOWCI_POLL_INTERVAL_SECS", "0");
        assert!(DeployConfig::from_env(&env).is_err());
    }

    #[test]
    fn debug_output_masks_secrets() {
        let env = base_env()
            .with("NOW_BASIC_AUTH_USERNAME", "admin")
            .with("NOW_BASIC_AUTH_PASSWORD", "hunter2");
        let shown = format!("{:?}", DeployConfig::from_env(&env).unwrap());
        assert!(!shown.contains("now-secret"));
        assert!(!shown.contains("gh-secret"));
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("admin"));
        assert!(shown.contains("example-app"));
    }

    #[test]
    fn redactor_covers_tokens_and_password() {
        let env = base_env()
            .with("NOW_BASIC_AUTH_USERNAME", "admin")
            .with("NOW_BASIC_AUTH_PASSWORD", "hunter2");
        let redactor = DeployConfig::from_env(&env).unwrap().redactor();
        let out = redactor.redact_str("now-secret gh-secret hunter2");
        assert_eq!(out, "[NOW_TOKEN] [GITHUB_TOKEN] [BASIC_AUTH_PASSWORD]");
    }
}
