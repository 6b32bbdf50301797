//! nowci - deploy static builds to Now from CI
//!
//! ## Commands
//!
//! - `deploy`: deploy the configured directory and report commit statuses
//! - `detect`: show what nowci would do for the current CI environment

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};

use nowci_core::{
    init_tracing, preflight, select_provider, DeployOutcome, DeployPlan, Deployer, Env,
    GithubStatusClient, NowClient, Preflight, ProcessRunner, StatusNotifier,
};

#[derive(Parser)]
#[command(name = "nowci")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deploy static builds to Now from Travis CI or CircleCI", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the build directory and report the result to GitHub
    Deploy {
        /// Seconds between readiness checks (overrides NOWCI_POLL_INTERVAL_SECS)
        #[arg(long)]
        poll_interval_secs: Option<u64>,

        /// Seconds to wait for the deployment to become ready (overrides NOWCI_READY_TIMEOUT_SECS)
        #[arg(long)]
        ready_timeout_secs: Option<u64>,
    },

    /// Show the detected CI provider and how this build would be handled
    Detect,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let env = Env::from_process();
    let result = match cli.command {
        Commands::Deploy {
            poll_interval_secs,
            ready_timeout_secs,
        } => deploy(&env, poll_interval_secs, ready_timeout_secs).await,
        Commands::Detect => detect(&env),
    };

    if let Err(e) = result {
        error!(error = %format!("{e:#}"), "nowci failed");
        std::process::exit(1);
    }
}

async fn deploy(
    env: &Env,
    poll_interval_secs: Option<u64>,
    ready_timeout_secs: Option<u64>,
) -> Result<()> {
    let DeployPlan {
        provider,
        stage,
        mut config,
    } = match preflight(env)? {
        Preflight::Skip { provider, reason } => {
            info!(provider = %provider, reason = %reason.as_str(), "Skipping deployment");
            return Ok(());
        }
        Preflight::Deploy(plan) => plan,
    };

    if let Some(secs) = poll_interval_secs {
        anyhow::ensure!(secs > 0, "--poll-interval-secs must be greater than zero");
        config.poll.interval = Duration::from_secs(secs);
    }
    if let Some(secs) = ready_timeout_secs {
        config.poll.timeout = Duration::from_secs(secs);
    }

    let redactor = config.redactor();
    let platform = NowClient::new(&config).context("Failed to create Now API client")?;
    let runner = ProcessRunner::new(redactor.clone());
    let sink = GithubStatusClient::new(&config, &provider.repository(), &provider.commit_sha())
        .context("Failed to create GitHub status client")?;
    let notifier = StatusNotifier::spawn(Arc::new(sink), redactor.clone());

    info!(
        provider = %provider.name(),
        stage = %stage,
        root = %config.root_dir.display(),
        "Starting deployment"
    );

    let result = Deployer::new(&config, provider.as_ref(), &platform, &runner, &notifier)
        .run(stage)
        .await;

    // Deliver queued statuses before the process exits.
    notifier.shutdown().await;

    match result {
        Ok(DeployOutcome::Deployed { url, alias, .. }) => {
            info!(url = %url, alias = ?alias, "Deployment succeeded");
            println!("{url}");
            Ok(())
        }
        Ok(outcome) => {
            info!(outcome = ?outcome, "Nothing deployed");
            Ok(())
        }
        Err(e) => anyhow::bail!("{}", redactor.redact_str(&e.to_string())),
    }
}

fn detect(env: &Env) -> Result<()> {
    let provider = select_provider(env)?;
    println!("Provider:    {}", provider.name());
    println!("Repository:  {}", provider.repository());
    println!("Commit:      {}", provider.commit_sha());
    println!("Build URL:   {}", provider.build_url());
    println!("Stage:       {}", provider.stage());
    println!("Fork:        {}", provider.is_fork());
    match provider.ensure_required_vars() {
        Ok(()) => println!("Variables:   ok"),
        Err(e) => println!("Variables:   {e}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_deploy_overrides() {
        let cli = Cli::try_parse_from([
            "nowci",
            "--json",
            "deploy",
            "--poll-interval-secs",
            "2",
            "--ready-timeout-secs",
            "30",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Deploy {
                poll_interval_secs,
                ready_timeout_secs,
            } => {
                assert_eq!(poll_interval_secs, Some(2));
                assert_eq!(ready_timeout_secs, Some(30));
            }
            Commands::Detect => panic!("expected deploy"),
        }
    }

    #[tokio::test]
    async fn deploy_skips_fork_without_side_effects() {
        let env = Env::from_pairs([
            ("CIRCLECI", "true"),
            ("CIRCLE_BUILD_NUM", "1"),
            ("CIRCLE_PROJECT_USERNAME", "acme"),
            ("CIRCLE_PROJECT_REPONAME", "site"),
            ("CIRCLE_SHA1", "abc"),
            ("CIRCLE_PULL_REQUEST", "https://github.com/acme/site/pull/3"),
            ("CIRCLE_PR_USERNAME", "mallory"),
        ]);
        deploy(&env, None, None).await.expect("fork build is skipped");
    }

    #[tokio::test]
    async fn deploy_outside_ci_fails() {
        assert!(deploy(&Env::default(), None, None).await.is_err());
    }
}
