//! Timed polling.

use std::future::Future;

use tokio::time::Instant;

use crate::config::PollSettings;
use crate::error::Result;

/// How a polling loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { attempts: u32 },
}

/// Run `check` every `settings.interval` until it yields a value or
/// `settings.timeout` elapses.
///
/// The first check runs one interval after the call. `Ok(None)` from `check`
/// keeps polling; an error stops the loop and is returned as is. The loop is
/// an ordinary future, so dropping it cancels polling.
pub async fn poll_until<T, F, Fut>(settings: PollSettings, mut check: F) -> Result<PollOutcome<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let mut attempts = 0u32;
    let started = Instant::now();

    let polling = async {
        loop {
            tokio::time::sleep(settings.interval).await;
            attempts += 1;
            if let Some(value) = check(attempts).await? {
                return Ok(value);
            }
        }
    };

    let result = tokio::time::timeout(settings.timeout, polling).await;
    match result {
        Ok(Ok(value)) => Ok(PollOutcome::Ready(value)),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            tracing::debug!(
                attempts,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Polling timed out"
            );
            Ok(PollOutcome::TimedOut { attempts })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;
    use std::time::Duration;

    fn settings(interval: u64, timeout: u64) -> PollSettings {
        PollSettings::new(Duration::from_secs(interval), Duration::from_secs(timeout))
    }

    #[tokio::test(start_paused = true)]
    async fn completes_on_fourth_tick() {
        let start = Instant::now();
        let outcome = poll_until(settings(5, 60), |attempt| async move {
            Ok((attempt == 4).then_some(attempt))
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Ready(4));
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_ready() {
        let start = Instant::now();
        let outcome: PollOutcome<()> =
            poll_until(settings(5, 60), |_| async { Ok(None) }).await.unwrap();

        match outcome {
            PollOutcome::TimedOut { attempts } => assert!(attempts >= 11),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn check_error_stops_polling() {
        let mut calls = 0;
        let result: Result<PollOutcome<()>> = poll_until(settings(1, 60), |_| {
            calls += 1;
            async { Err(DeployError::Http("connection reset".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(DeployError::Http(_))));
        assert_eq!(calls, 1);
    }
}
