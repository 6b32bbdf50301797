//! Travis CI.

use super::{owner_of, primary_branch, require_all, CiProvider, Stage};
use crate::config::Env;
use crate::error::{DeployError, Result};

const REQUIRED: [&str; 5] = [
    "TRAVIS_BUILD_ID",
    "TRAVIS_REPO_SLUG",
    "TRAVIS_COMMIT",
    "TRAVIS_EVENT_TYPE",
    "TRAVIS_INSTANCE",
];

#[derive(Debug, Clone)]
pub struct TravisProvider {
    env: Env,
}

impl TravisProvider {
    pub fn new(env: Env) -> Self {
        Self { env }
    }

    fn var(&self, key: &str) -> String {
        self.env.get(key).unwrap_or_default().to_string()
    }

    fn pull_request_slug(&self) -> Option<&str> {
        self.env.get("TRAVIS_PULL_REQUEST_SLUG")
    }
}

impl CiProvider for TravisProvider {
    fn name(&self) -> &'static str {
        "travis"
    }

    fn detect(&self) -> bool {
        self.env.is("TRAVIS", "true")
    }

    fn ensure_required_vars(&self) -> Result<()> {
        require_all(&self.env, &REQUIRED)?;
        match self.env.get("TRAVIS_INSTANCE") {
            Some("org") | Some("com") => Ok(()),
            Some(other) => Err(DeployError::invalid(
                "TRAVIS_INSTANCE",
                format!("expected \"org\" or \"com\", got {other:?}"),
            )),
            None => Err(DeployError::missing("TRAVIS_INSTANCE")),
        }
    }

    fn is_fork(&self) -> bool {
        match self.pull_request_slug() {
            Some(pr_slug) => owner_of(pr_slug) != owner_of(&self.repository()),
            None => false,
        }
    }

    fn stage(&self) -> Stage {
        match self.env.get("TRAVIS_EVENT_TYPE") {
            Some("pull_request") => Stage::Staging,
            Some("push") if self.env.get("TRAVIS_BRANCH") == Some(primary_branch(&self.env)) => {
                Stage::Production
            }
            Some("push") => Stage::Staging,
            _ => Stage::Unsupported,
        }
    }

    fn repository(&self) -> String {
        self.var("TRAVIS_REPO_SLUG")
    }

    fn build_url(&self) -> String {
        format!(
            "https://travis-ci.{}/{}/builds/{}",
            self.var("TRAVIS_INSTANCE"),
            self.repository(),
            self.var("TRAVIS_BUILD_ID")
        )
    }

    fn commit_sha(&self) -> String {
        // For pull requests TRAVIS_COMMIT is the merge commit; statuses belong
        // on the head commit.
        self.env
            .get("TRAVIS_PULL_REQUEST_SHA")
            .map(str::to_string)
            .unwrap_or_else(|| self.var("TRAVIS_COMMIT"))
    }
}
