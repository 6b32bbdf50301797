//! CI provider detection and build metadata.
//!
//! Each supported CI system implements [`CiProvider`] over an [`Env`]
//! snapshot. [`select_provider`] scans the built-in providers in a fixed
//! order and returns the first whose detector matches.

mod circle;
mod travis;

pub use circle::CircleProvider;
pub use travis::TravisProvider;

use serde::{Deserialize, Serialize};

use crate::config::Env;
use crate::error::{DeployError, Result};

/// Variable naming the branch whose pushes deploy to production.
pub const PRIMARY_BRANCH_VAR: &str = "NOWCI_PRIMARY_BRANCH";
pub const DEFAULT_PRIMARY_BRANCH: &str = "master";

/// Classification of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Preview deployment, e.g. for a pull request.
    Staging,
    /// Deployment promoted to the production alias.
    Production,
    /// Event that is not deployed at all.
    Unsupported,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Staging => "staging",
            Stage::Production => "production",
            Stage::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A CI system the deployment can run under.
pub trait CiProvider: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the environment belongs to this CI system.
    fn detect(&self) -> bool;

    /// Fail with the first missing provider variable.
    fn ensure_required_vars(&self) -> Result<()>;

    /// Whether the build comes from a pull request opened from another
    /// owner's repository.
    fn is_fork(&self) -> bool;

    fn stage(&self) -> Stage;

    /// `owner/repo` of the target repository.
    fn repository(&self) -> String;

    fn build_url(&self) -> String;

    fn commit_sha(&self) -> String;
}

/// Pick the active provider. The first matching detector wins.
pub fn select_provider(env: &Env) -> Result<Box<dyn CiProvider>> {
    builtin_providers(env)
        .into_iter()
        .find(|provider| provider.detect())
        .ok_or(DeployError::NoProviderDetected)
}

/// Built-in providers, in detection order.
pub fn builtin_providers(env: &Env) -> Vec<Box<dyn CiProvider>> {
    vec![
        Box::new(TravisProvider::new(env.clone())),
        Box::new(CircleProvider::new(env.clone())),
    ]
}

/// Check `vars` in order against `env`.
pub(crate) fn require_all(env: &Env, vars: &[&str]) -> Result<()> {
    for var in vars {
        env.require(var)?;
    }
    Ok(())
}

/// Owner segment of an `owner/repo` slug.
pub(crate) fn owner_of(slug: &str) -> &str {
    slug.split('/').next().unwrap_or("")
}

pub(crate) fn primary_branch(env: &Env) -> &str {
    env.get(PRIMARY_BRANCH_VAR).unwrap_or(DEFAULT_PRIMARY_BRANCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_travis() {
        let env = Env::from_pairs([("TRAVIS", "true")]);
        assert_eq!(select_provider(&env).unwrap().name(), "travis");
    }

    #[test]
    fn selects_circle() {
        let env = Env::from_pairs([("CIRCLECI", "true")]);
        assert_eq!(select_provider(&env).unwrap().name(), "circleci");
    }

    #[test]
    fn first_detector_wins_when_both_match() {
        let env = Env::from_pairs([("CIRCLECI", "true"), ("TRAVIS", "true")]);
        assert_eq!(select_provider(&env).unwrap().name(), "travis");
    }

    #[test]
    fn no_provider_is_an_error() {
        let env = Env::from_pairs([("CI", "true")]);
        assert!(matches!(
            select_provider(&env),
            Err(DeployError::NoProviderDetected)
        ));
    }

    #[test]
    fn owner_segment() {
        assert_eq!(owner_of("acme/site"), "acme");
        assert_eq!(owner_of("acme"), "acme");
        assert_eq!(owner_of(""), "");
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Production.to_string(), "production");
        assert_eq!(Stage::Staging.as_str(), "staging");
    }
}
