//! CircleCI.

use super::{require_all, CiProvider, Stage};
use crate::config::Env;
use crate::error::Result;

const REQUIRED: [&str; 4] = [
    "CIRCLE_BUILD_NUM",
    "CIRCLE_PROJECT_USERNAME",
    "CIRCLE_PROJECT_REPONAME",
    "CIRCLE_SHA1",
];

#[derive(Debug, Clone)]
pub struct CircleProvider {
    env: Env,
}

impl CircleProvider {
    pub fn new(env: Env) -> Self {
        Self { env }
    }

    fn var(&self, key: &str) -> &str {
        self.env.get(key).unwrap_or_default()
    }
}

impl CiProvider for CircleProvider {
    fn name(&self) -> &'static str {
        "circleci"
    }

    fn detect(&self) -> bool {
        self.env.is("CIRCLECI", "true")
    }

    fn ensure_required_vars(&self) -> Result<()> {
        require_all(&self.env, &REQUIRED)
    }

    // CIRCLE_PR_USERNAME is only exported for pull requests from forks.
    fn is_fork(&self) -> bool {
        match self.env.get("CIRCLE_PR_USERNAME") {
            Some(pr_owner) => pr_owner != self.var("CIRCLE_PROJECT_USERNAME"),
            None => false,
        }
    }

    fn stage(&self) -> Stage {
        if self.env.get("CIRCLE_PULL_REQUEST").is_some() {
            Stage::Staging
        } else {
            Stage::Production
        }
    }

    fn repository(&self) -> String {
        format!(
            "{}/{}",
            self.var("CIRCLE_PROJECT_USERNAME"),
            self.var("CIRCLE_PROJECT_REPONAME")
        )
    }

    fn build_url(&self) -> String {
        format!(
            "https://circleci.com/gh/{}/{}",
            self.repository(),
            self.var("CIRCLE_BUILD_NUM")
        )
    }

    fn commit_sha(&self) -> String {
        self.var("CIRCLE_SHA1").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;

    fn branch_env() -> Env {
        Env::from_pairs([
            ("CIRCLECI", "true"),
            ("CIRCLE_BUILD_NUM", "88"),
            ("CIRCLE_PROJECT_USERNAME", "acme"),
            ("CIRCLE_PROJECT_REPONAME", "site"),
            ("CIRCLE_SHA1", "deadbeef"),
            ("CIRCLE_BRANCH", "master"),
        ])
    }

    fn pr_env() -> Env {
        branch_env()
            .with("CIRCLE_BRANCH", "pull/9")
            .with("CIRCLE_PULL_REQUEST", "https://github.com/acme/site/pull/9")
    }

    #[test]
    fn detects_circle_marker() {
        assert!(CircleProvider::new(branch_env()).detect());
        assert!(!CircleProvider::new(Env::default()).detect());
    }

    #[test]
    fn required_vars_checked_in_order() {
        let env = branch_env()
            .without("CIRCLE_PROJECT_REPONAME")
            .without("CIRCLE_SHA1");
        match CircleProvider::new(env).ensure_required_vars() {
            Err(DeployError::MissingConfiguration { variable }) => {
                assert_eq!(variable, "CIRCLE_PROJECT_REPONAME")
            }
            other => panic!("expected missing variable, got {other:?}"),
        }
    }

    #[test]
    fn fork_detection_compares_owners() {
        let fork = pr_env().with("CIRCLE_PR_USERNAME", "mallory");
        assert!(CircleProvider::new(fork).is_fork());

        let same_owner = pr_env().with("CIRCLE_PR_USERNAME", "acme");
        assert!(!CircleProvider::new(same_owner).is_fork());

        assert!(!CircleProvider::new(pr_env()).is_fork());
        assert!(!CircleProvider::new(branch_env()).is_fork());
    }

    #[test]
    fn any_non_pull_request_build_is_production() {
        assert_eq!(CircleProvider::new(branch_env()).stage(), Stage::Production);
        let other_branch = branch_env().with("CIRCLE_BRANCH", "feature/x");
        assert_eq!(CircleProvider::new(other_branch).stage(), Stage::Production);
        assert_eq!(CircleProvider::new(pr_env()).stage(), Stage::Staging);
    }

    #[test]
    fn derives_repository_build_url_and_sha() {
        let provider = CircleProvider::new(branch_env());
        assert_eq!(provider.repository(), "acme/site");
        assert_eq!(provider.build_url(), "https://circleci.com/gh/acme/site/88");
        assert_eq!(provider.commit_sha(), "deadbeef");
    }
}
