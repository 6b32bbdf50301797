//! In-memory fakes for the deployment ports (testing only)
//!
//! Provides `ScriptedPlatform`, `ScriptedRunner` and `RecordingStatusSink`
//! that satisfy the trait contracts without network or subprocess access,
//! and count every call so tests can assert on side effects.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{DeployError, Result};
use crate::platform::{AliasOutcome, Deployment, DeploymentPlatform, DeploymentState};
use crate::runner::CommandRunner;
use crate::status::{StatusSink, StatusUpdate};

// ---------------------------------------------------------------------------
// ScriptedPlatform
// ---------------------------------------------------------------------------

/// Scripted response to an alias request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasScript {
    Created,
    AlreadyAssigned,
    Fail { status: u16, message: String },
}

/// Deployment platform that replays a scripted sequence of states.
///
/// Each `get` consumes one state; the last state repeats forever.
#[derive(Debug)]
pub struct ScriptedPlatform {
    id: String,
    host: String,
    states: Mutex<VecDeque<DeploymentState>>,
    alias: AliasScript,
    calls: AtomicUsize,
    polls: AtomicUsize,
    alias_requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedPlatform {
    /// Platform knowing one deployment `id` served at `host`, ready at once.
    pub fn new(id: &str, host: &str) -> Self {
        Self {
            id: id.to_string(),
            host: host.to_string(),
            states: Mutex::new(VecDeque::from([DeploymentState::Ready])),
            alias: AliasScript::Created,
            calls: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            alias_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_states(self, states: Vec<DeploymentState>) -> Self {
        *self.states.lock().unwrap() = states.into();
        self
    }

    pub fn with_alias(mut self, alias: AliasScript) -> Self {
        self.alias = alias;
        self
    }

    /// Total number of API calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `get` calls.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// `(deployment id, alias)` pairs requested so far.
    pub fn alias_requests(&self) -> Vec<(String, String)> {
        self.alias_requests.lock().unwrap().clone()
    }

    fn next_state(&self) -> DeploymentState {
        let mut states = self.states.lock().unwrap();
        if states.len() > 1 {
            states.pop_front().unwrap_or(DeploymentState::Unknown)
        } else {
            states.front().copied().unwrap_or(DeploymentState::Unknown)
        }
    }

    fn not_found(&self, what: &str) -> DeployError {
        DeployError::Platform {
            status: 404,
            message: format!("deployment not found: {what}"),
        }
    }
}

#[async_trait]
impl DeploymentPlatform for ScriptedPlatform {
    async fn find_by_url(&self, host: &str) -> Result<Deployment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if host != self.host {
            return Err(self.not_found(host));
        }
        Ok(Deployment {
            id: self.id.clone(),
            url: self.host.clone(),
            state: DeploymentState::Initializing,
        })
    }

    async fn get(&self, id: &str) -> Result<Deployment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.polls.fetch_add(1, Ordering::SeqCst);
        if id != self.id {
            return Err(self.not_found(id));
        }
        Ok(Deployment {
            id: self.id.clone(),
            url: self.host.clone(),
            state: self.next_state(),
        })
    }

    async fn create_alias(&self, id: &str, alias: &str) -> Result<AliasOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.alias_requests
            .lock()
            .unwrap()
            .push((id.to_string(), alias.to_string()));
        match &self.alias {
            AliasScript::Created => Ok(AliasOutcome::Created),
            AliasScript::AlreadyAssigned => Ok(AliasOutcome::AlreadyAssigned),
            AliasScript::Fail { status, message } => Err(DeployError::Platform {
                status: *status,
                message: message.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum RunScript {
    Stdout(String),
    Stderr(String),
    LaunchFailure,
}

/// Command runner returning canned output.
#[derive(Debug)]
pub struct ScriptedRunner {
    script: RunScript,
    invocations: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedRunner {
    fn scripted(script: RunScript) -> Self {
        Self {
            script,
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Succeed with `stdout`.
    pub fn stdout(stdout: &str) -> Self {
        Self::scripted(RunScript::Stdout(stdout.to_string()))
    }

    /// Fail as if the command wrote `stderr`.
    pub fn stderr(stderr: &str) -> Self {
        Self::scripted(RunScript::Stderr(stderr.to_string()))
    }

    /// Fail as if the program could not be started.
    pub fn launch_failure() -> Self {
        Self::scripted(RunScript::LaunchFailure)
    }

    pub fn invocations(&self) -> Vec<(String, Vec<String>)> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        self.invocations
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        match &self.script {
            RunScript::Stdout(stdout) => Ok(stdout.clone()),
            RunScript::Stderr(stderr) => Err(DeployError::SubprocessOutput(stderr.clone())),
            RunScript::LaunchFailure => Err(DeployError::SubprocessLaunch {
                program: program.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "program not found"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingStatusSink
// ---------------------------------------------------------------------------

/// Status sink that records delivered updates.
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    fail: bool,
    attempts: AtomicUsize,
    updates: Mutex<Vec<StatusUpdate>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose every post fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Successfully delivered updates, in delivery order.
    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().unwrap().clone()
    }

    /// Number of post attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSink for RecordingStatusSink {
    async fn post(&self, update: &StatusUpdate) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DeployError::Platform {
                status: 500,
                message: "status API unavailable".to_string(),
            });
        }
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}
