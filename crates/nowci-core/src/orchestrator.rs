//! Deployment orchestration.
//!
//! [`Deployer`] drives one deployment attempt through
//! `Validating -> Deploying -> AwaitingReady -> (Aliasing) -> Done`, moving to
//! `Failed` on any error. Once the first pending status has been queued, every
//! failure queues an error status before the error is returned, so the pull
//! request never stays pending.

use tracing::{info, Instrument};

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::obs;
use crate::platform::{AliasOutcome, Deployment, DeploymentPlatform, DeploymentState};
use crate::poll::{poll_until, PollOutcome};
use crate::provider::{CiProvider, Stage};
use crate::runner::CommandRunner;
use crate::status::{StatusNotifier, StatusState, StatusUpdate};
use crate::urls::{extract_first_url, strip_protocol};

/// Orchestrator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployPhase {
    Idle,
    Validating,
    Deploying,
    AwaitingReady,
    Aliasing,
    Done,
    Failed,
}

impl DeployPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployPhase::Idle => "idle",
            DeployPhase::Validating => "validating",
            DeployPhase::Deploying => "deploying",
            DeployPhase::AwaitingReady => "awaiting_ready",
            DeployPhase::Aliasing => "aliasing",
            DeployPhase::Done => "done",
            DeployPhase::Failed => "failed",
        }
    }
}

/// Final result of a deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Pull request from a fork; nothing was deployed or reported.
    SkippedFork,
    /// Event type that is never deployed.
    SkippedUnsupported,
    Deployed {
        url: String,
        deployment_id: String,
        /// Set for production deployments.
        alias: Option<AliasOutcome>,
    },
}

/// CLI arguments for the deployment command.
pub fn deploy_args(config: &DeployConfig) -> Vec<String> {
    let mut args = vec![
        "--token".to_string(),
        config.now_token.clone(),
        "--no-clipboard".to_string(),
    ];
    if config.public {
        args.push("--public".to_string());
    }
    if config.static_site {
        args.push("--static".to_string());
    }
    if let Some(team) = &config.team {
        args.push("--team".to_string());
        args.push(team.clone());
    }
    if let Some(auth) = &config.basic_auth {
        args.push("-e".to_string());
        args.push(format!("BASIC_AUTH_USERNAME={}", auth.username));
        args.push("-e".to_string());
        args.push(format!("BASIC_AUTH_PASSWORD={}", auth.password));
    }
    args.push(config.name.clone());
    args.push(config.root_dir.to_string_lossy().into_owned());
    args
}

/// Runs one deployment attempt.
pub struct Deployer<'a> {
    config: &'a DeployConfig,
    provider: &'a dyn CiProvider,
    platform: &'a dyn DeploymentPlatform,
    runner: &'a dyn CommandRunner,
    notifier: &'a StatusNotifier,
    phase: DeployPhase,
}

impl<'a> Deployer<'a> {
    pub fn new(
        config: &'a DeployConfig,
        provider: &'a dyn CiProvider,
        platform: &'a dyn DeploymentPlatform,
        runner: &'a dyn CommandRunner,
        notifier: &'a StatusNotifier,
    ) -> Self {
        Self {
            config,
            provider,
            platform,
            runner,
            notifier,
            phase: DeployPhase::Idle,
        }
    }

    pub fn phase(&self) -> DeployPhase {
        self.phase
    }

    /// Deploy the configured directory for a build classified as `stage`.
    pub async fn run(&mut self, stage: Stage) -> Result<DeployOutcome> {
        let span = obs::deploy_span(
            self.provider.name(),
            &self.provider.repository(),
            &self.provider.commit_sha(),
            stage.as_str(),
        );
        self.run_inner(stage).instrument(span).await
    }

    async fn run_inner(&mut self, stage: Stage) -> Result<DeployOutcome> {
        self.transition(DeployPhase::Validating);
        if let Err(e) = self.provider.ensure_required_vars() {
            self.transition(DeployPhase::Failed);
            return Err(e);
        }

        if self.provider.is_fork() {
            obs::emit_deploy_skipped("fork");
            return Ok(DeployOutcome::SkippedFork);
        }
        if stage == Stage::Unsupported {
            obs::emit_deploy_skipped("unsupported event");
            return Ok(DeployOutcome::SkippedUnsupported);
        }

        let build_url = self.provider.build_url();
        self.notify(StatusState::Pending, "Deployment pending".to_string(), &build_url);

        match self.deploy(stage).await {
            Ok(outcome) => {
                if let DeployOutcome::Deployed { url, .. } = &outcome {
                    self.notify(
                        StatusState::Success,
                        format!("Deployment to {stage} succeeded"),
                        url,
                    );
                    obs::emit_deploy_finished(stage.as_str(), url, true);
                }
                self.transition(DeployPhase::Done);
                Ok(outcome)
            }
            Err(e) => {
                self.transition(DeployPhase::Failed);
                self.notify(
                    StatusState::Error,
                    format!("Deployment to {stage} failed"),
                    &build_url,
                );
                obs::emit_deploy_finished(stage.as_str(), &build_url, false);
                Err(e)
            }
        }
    }

    async fn deploy(&mut self, stage: Stage) -> Result<DeployOutcome> {
        self.transition(DeployPhase::Deploying);
        let args = deploy_args(self.config);
        let stdout = self.runner.run(&self.config.now_cli, &args).await?;
        let url = extract_first_url(&stdout).ok_or(DeployError::MissingDeploymentUrl)?;
        info!(url = %url, "Deployment created");
        self.notify(StatusState::Pending, "Build started".to_string(), &url);

        self.transition(DeployPhase::AwaitingReady);
        let deployment = self.await_ready(&url).await?;
        info!(url = %url, id = %deployment.id, "Deployment is ready");

        let alias = if stage == Stage::Production {
            self.transition(DeployPhase::Aliasing);
            Some(self.promote(&deployment).await?)
        } else {
            None
        };

        Ok(DeployOutcome::Deployed {
            url,
            deployment_id: deployment.id,
            alias,
        })
    }

    async fn await_ready(&self, url: &str) -> Result<Deployment> {
        let platform = self.platform;
        let found = platform.find_by_url(strip_protocol(url)).await?;
        let id = found.id;

        let outcome = poll_until(self.config.poll, |attempt| {
            let id = id.clone();
            let url = url.to_string();
            async move {
                let deployment = platform.get(&id).await?;
                obs::emit_poll_tick(attempt, deployment.state.as_str());
                match deployment.state {
                    DeploymentState::Ready => Ok(Some(deployment)),
                    state if state.is_failed() => Err(DeployError::DeploymentFailed {
                        url,
                        state: state.to_string(),
                    }),
                    _ => Ok(None),
                }
            }
        })
        .await?;

        match outcome {
            PollOutcome::Ready(deployment) => Ok(deployment),
            PollOutcome::TimedOut { .. } => Err(DeployError::DeploymentTimeout {
                url: url.to_string(),
                timeout_secs: self.config.poll.timeout.as_secs(),
            }),
        }
    }

    async fn promote(&self, deployment: &Deployment) -> Result<AliasOutcome> {
        let outcome = self
            .platform
            .create_alias(&deployment.id, &self.config.alias)
            .await?;
        match outcome {
            AliasOutcome::Created => info!(alias = %self.config.alias, "Alias created"),
            AliasOutcome::AlreadyAssigned => {
                info!(alias = %self.config.alias, "Alias already points at this deployment")
            }
        }
        Ok(outcome)
    }

    fn transition(&mut self, phase: DeployPhase) {
        self.phase = phase;
        obs::emit_phase(phase.as_str());
    }

    fn notify(&self, state: StatusState, description: String, target_url: &str) {
        self.notifier.notify(StatusUpdate::new(
            state,
            description,
            target_url,
            self.config.status_context.clone(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Env;

    fn config(extra: &[(&str, &str)]) -> DeployConfig {
        let mut env = Env::from_pairs([
            ("NOW_DEPLOY_ROOT", "build"),
            ("NOW_TOKEN", "now-tok"),
            ("GITHUB_TOKEN", "gh-tok"),
            ("NOW_NAME", "example-app"),
            ("NOW_ALIAS", "example.com"),
        ]);
        for (k, v) in extra {
            env = env.with(k, v);
        }
        DeployConfig::from_env(&env).unwrap()
    }

    #[test]
    fn minimal_deploy_args() {
        assert_eq!(
            deploy_args(&config(&[])),
            vec!["--token", "now-tok", "--no-clipboard", "example-app", "build"]
        );
    }

    #[test]
    fn full_deploy_args() {
        let args = deploy_args(&config(&[
            ("NOW_PUBLIC", "true"),
            ("NOW_STATIC", "true"),
            ("NOW_TEAM", "acme"),
            ("NOW_BASIC_AUTH_USERNAME", "admin"),
            ("NOW_BASIC_AUTH_PASSWORD", "pw"),
        ]));
        assert_eq!(
            args,
            vec![
                "--token",
                "now-tok",
                "--no-clipboard",
                "--public",
                "--static",
                "--team",
                "acme",
                "-e",
                "BASIC_AUTH_USERNAME=admin",
                "-e",
                "BASIC_AUTH_PASSWORD=pw",
                "example-app",
                "build",
            ]
        );
    }

    #[test]
    fn phase_names() {
        assert_eq!(DeployPhase::AwaitingReady.as_str(), "awaiting_ready");
        assert_eq!(DeployPhase::Failed.as_str(), "failed");
    }
}
