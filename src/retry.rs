//! Opt-in exponential backoff for flaky network calls.
//!
//! Nothing in the pipeline retries by default; callers wrap individual
//! calls where a retry is safe (idempotent reads, remote config writes
//! after a re-read).

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            multiplier: 2,
        }
    }
}

/// Run `operation` until it succeeds or the attempt budget is spent,
/// sleeping with exponential backoff between attempts. Returns the last
/// error when every attempt failed.
pub async fn with_backoff<T, E, F, Fut>(backoff: Backoff, mut operation: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = backoff.initial_delay;
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < backoff.max_attempts => {
                warn!(
                    attempt,
                    max_attempts = backoff.max_attempts,
                    error = %err,
                    delay_secs = delay.as_secs_f64(),
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= backoff.multiplier;
                attempt += 1;
            }
            Err(err) => {
                error!(attempts = backoff.max_attempts, error = %err, "All attempts failed");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> Backoff {
        Backoff {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            multiplier: 2,
        }
    }

    #[tokio::test]
    async fn succeeds_first_try_without_retrying() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_backoff(fast(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, String> = with_backoff(fast(), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(format!("attempt {attempt} failed"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_when_budget_spent() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_backoff(fast(), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(format!("failure {attempt}")) }
        })
        .await;
        assert_eq!(result.unwrap_err(), "failure 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
