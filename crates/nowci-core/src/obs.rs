//! Structured observability hooks for the deployment lifecycle.
//!
//! This module provides:
//! - A deployment-scoped tracing span
//! - Emission functions for phase transitions, poll ticks and status posts
//!
//! Events are emitted at `info!` level unless noted. Callers pass already
//! redacted text.

use tracing::{debug, info, warn, Span};

/// Span scoping one deployment attempt.
///
/// ```ignore
/// deployer.run_inner(stage).instrument(deploy_span("travis", "acme/site", "c0ffee", "staging")).await
/// // every event inside is tagged with provider, repository, commit and stage
/// ```
pub fn deploy_span(provider: &str, repository: &str, commit: &str, stage: &str) -> Span {
    tracing::info_span!(
        "nowci.deploy",
        provider = %provider,
        repository = %repository,
        commit = %commit,
        stage = %stage
    )
}

/// Emit event: orchestrator moved to a new phase.
pub fn emit_phase(phase: &str) {
    info!(event = "deploy.phase", phase = %phase);
}

/// Emit event: build skipped before any side effect.
pub fn emit_deploy_skipped(reason: &str) {
    info!(event = "deploy.skipped", reason = %reason);
}

/// Emit event: one readiness check completed.
pub fn emit_poll_tick(attempt: u32, state: &str) {
    debug!(event = "deploy.poll", attempt = attempt, state = %state);
}

/// Emit event: deployment reached its final outcome.
pub fn emit_deploy_finished(stage: &str, url: &str, success: bool) {
    info!(
        event = "deploy.finished",
        stage = %stage,
        url = %url,
        success = success
    );
}

/// Emit event: commit status delivered.
pub fn emit_status_posted(state: &str, target_url: &str) {
    info!(event = "status.posted", state = %state, target_url = %target_url);
}

/// Emit event: commit status delivery failed (warning level).
pub fn emit_status_failed(state: &str, error: &str) {
    warn!(event = "status.failed", state = %state, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_span_create() {
        let span = deploy_span("travis", "acme/site", "c0ffee", "staging");
        let _guard = span.enter();
        emit_phase("validating");
    }
}
