//! Deployment command execution.
//!
//! [`ProcessRunner`] launches the deployment CLI, streams both output pipes
//! line by line into the log (redacted), and returns the captured stdout.
//! Any stderr output fails the call, whatever the exit code.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{DeployError, Result};
use crate::redact::Redactor;

/// Runs an external program and returns its stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<String>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    redactor: Redactor,
}

impl ProcessRunner {
    pub fn new(redactor: Redactor) -> Self {
        Self { redactor }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        let start = Instant::now();
        debug!(
            program = %program,
            args = %self.redactor.redact_str(&args.join(" ")),
            "Launching command"
        );

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DeployError::SubprocessLaunch {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| uncaptured("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| uncaptured("stderr"))?;

        let (stdout, stderr) = tokio::try_join!(
            drain(stdout, Stream::Stdout, &self.redactor),
            drain(stderr, Stream::Stderr, &self.redactor),
        )?;
        let status = child.wait().await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(program = %program, duration_ms, exit_code = ?status.code(), "Command finished");

        if !stderr.is_empty() {
            return Err(DeployError::SubprocessOutput(
                self.redactor.redact_str(stderr.trim()),
            ));
        }
        if !status.success() {
            warn!(program = %program, exit_code = ?status.code(), "Command exited unsuccessfully without stderr output");
        }

        Ok(stdout)
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

async fn drain<R>(reader: R, stream: Stream, redactor: &Redactor) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut captured = String::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        // The CLI may print stray non-UTF-8 bytes; they must not abort the run.
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        let shown = redactor.redact_str(line);
        match stream {
            Stream::Stdout => info!(stream = "stdout", "{shown}"),
            Stream::Stderr => warn!(stream = "stderr", "{shown}"),
        }
        captured.push_str(line);
        captured.push('\n');
    }
    Ok(captured)
}

fn uncaptured(pipe: &str) -> DeployError {
    DeployError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("{pipe} was not captured"),
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn returns_captured_stdout() {
        let runner = ProcessRunner::default();
        let out = runner
            .run("sh", &sh("echo hello; echo https://app.now.sh"))
            .await
            .expect("run failed");
        assert_eq!(out, "hello\nhttps://app.now.sh\n");
    }

    #[tokio::test]
    async fn stderr_fails_even_with_zero_exit() {
        let runner = ProcessRunner::default();
        let err = runner
            .run("sh", &sh("echo ok; echo 'Error! bad things' >&2; exit 0"))
            .await
            .unwrap_err();
        match err {
            DeployError::SubprocessOutput(text) => assert_eq!(text, "Error! bad things"),
            other => panic!("expected subprocess output error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_stderr_line_still_fails() {
        let runner = ProcessRunner::default();
        let err = runner
            .run("sh", &sh("echo https://a.now.sh; printf '\\n' >&2"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::SubprocessOutput(_)));
    }

    #[tokio::test]
    async fn invalid_utf8_output_is_decoded_lossily() {
        let runner = ProcessRunner::default();
        let out = runner
            .run("sh", &sh("printf 'Deployed to https://a.now.sh \\377\\n'"))
            .await
            .expect("stray bytes must not fail the run");
        assert_eq!(out, "Deployed to https://a.now.sh \u{FFFD}\n");
        assert_eq!(
            crate::urls::extract_first_url(&out).as_deref(),
            Some("https://a.now.sh")
        );
    }

    #[tokio::test]
    async fn nonzero_exit_without_stderr_still_returns_stdout() {
        let runner = ProcessRunner::default();
        let out = runner.run("sh", &sh("echo partial; exit 3")).await.unwrap();
        assert_eq!(out, "partial\n");
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let runner = ProcessRunner::default();
        let err = runner
            .run("/nonexistent/nowci-test-binary", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::SubprocessLaunch { .. }));
    }

    #[tokio::test]
    async fn stderr_error_is_redacted() {
        let runner = ProcessRunner::new(Redactor::new().with_secret("s3cr3t", "[NOW_TOKEN]"));
        let err = runner
            .run("sh", &sh("echo 'invalid token s3cr3t' >&2"))
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(!text.contains("s3cr3t"));
        assert!(text.contains("[NOW_TOKEN]"));
    }

    #[tokio::test]
    async fn passes_arguments_to_program() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-now");
        std::fs::write(&script, "for arg in \"$@\"; do echo \"$arg\"; done\n").unwrap();

        let runner = ProcessRunner::default();
        let args = vec![
            script.to_string_lossy().to_string(),
            "--token".to_string(),
            "abc".to_string(),
            "my app".to_string(),
        ];
        let out = runner.run("sh", &args).await.unwrap();
        assert_eq!(out, "--token\nabc\nmy app\n");
    }
}
