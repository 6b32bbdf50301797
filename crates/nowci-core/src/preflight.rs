//! Startup checks run before any side effect.
//!
//! Provider detection and the fork check come before configuration loading:
//! CI systems withhold secrets from fork pull requests, so a fork build would
//! otherwise fail on a missing token instead of being skipped.

use tracing::info;

use crate::config::{DeployConfig, Env};
use crate::error::Result;
use crate::obs;
use crate::provider::{select_provider, CiProvider, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Fork,
    UnsupportedEvent,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Fork => "fork",
            SkipReason::UnsupportedEvent => "unsupported event",
        }
    }
}

/// Everything needed to run a deployment.
pub struct DeployPlan {
    pub provider: Box<dyn CiProvider>,
    pub stage: Stage,
    pub config: DeployConfig,
}

pub enum Preflight {
    Skip {
        provider: &'static str,
        reason: SkipReason,
    },
    Deploy(DeployPlan),
}

/// Detect the provider, filter out builds that are not deployed, and load
/// the configuration.
pub fn preflight(env: &Env) -> Result<Preflight> {
    let provider = select_provider(env)?;
    info!(provider = %provider.name(), "Detected CI provider");

    if provider.is_fork() {
        obs::emit_deploy_skipped(SkipReason::Fork.as_str());
        return Ok(Preflight::Skip {
            provider: provider.name(),
            reason: SkipReason::Fork,
        });
    }

    let stage = provider.stage();
    if stage == Stage::Unsupported {
        obs::emit_deploy_skipped(SkipReason::UnsupportedEvent.as_str());
        return Ok(Preflight::Skip {
            provider: provider.name(),
            reason: SkipReason::UnsupportedEvent,
        });
    }

    let config = DeployConfig::from_env(env)?;
    provider.ensure_required_vars()?;

    Ok(Preflight::Deploy(DeployPlan {
        provider,
        stage,
        config,
    }))
}
