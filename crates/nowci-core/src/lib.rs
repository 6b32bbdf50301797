//! nowci core library
//!
//! Deploys a static build directory to the Now platform from a CI job:
//! - Detects the CI provider (Travis CI, CircleCI) and classifies the build
//! - Runs the deployment CLI and waits for the deployment to become ready
//! - Promotes production builds to the configured alias
//! - Reports pending/success/error commit statuses to GitHub

pub mod config;
pub mod error;
pub mod fakes;
pub mod obs;
pub mod orchestrator;
pub mod platform;
pub mod poll;
pub mod preflight;
pub mod provider;
pub mod redact;
pub mod runner;
pub mod status;
pub mod telemetry;
pub mod urls;

pub use config::{BasicAuth, DeployConfig, Env, PollSettings};
pub use error::{DeployError, Result};
pub use orchestrator::{deploy_args, DeployOutcome, DeployPhase, Deployer};
pub use platform::{AliasOutcome, Deployment, DeploymentPlatform, DeploymentState, NowClient};
pub use poll::{poll_until, PollOutcome};
pub use preflight::{preflight, DeployPlan, Preflight, SkipReason};
pub use provider::{select_provider, CiProvider, CircleProvider, Stage, TravisProvider};
pub use redact::{LogValue, Redactor, CIRCULAR};
pub use runner::{CommandRunner, ProcessRunner};
pub use status::{GithubStatusClient, StatusNotifier, StatusSink, StatusState, StatusUpdate};
pub use telemetry::init_tracing;
pub use urls::{extract_first_url, strip_protocol};
