//! Fixed-delay retry and cancellable sleeps
//!
//! Remote listings can come back empty for a while after a job ends (shared
//! filesystems flush late), so the artifact engine retries an operation a
//! fixed number of times until its result is acceptable. Errors are never
//! retried here: they abort immediately.
//!
//! # Example
//!
//! ```no_run
//! use exp_tracker::retry::{RetryPolicy, retry_until};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> exp_tracker::Result<()> {
//! let policy = RetryPolicy::default();
//! let cancel = CancellationToken::new();
//! let outcome = retry_until(&policy, &cancel, "listing", || async {
//!     Ok::<Vec<String>, exp_tracker::Error>(vec![])
//! }, |files| !files.is_empty())
//! .await?;
//! println!("{} attempts, accepted: {}", outcome.attempts, outcome.accepted);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Number of attempts and the pause between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause between attempts; none before the first
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    /// Six attempts three seconds apart
    fn default() -> Self {
        Self::new(6, Duration::from_secs(3))
    }
}

/// Result of [`retry_until`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    /// The accepted value, or the last one produced if none was accepted
    pub value: T,
    /// How many times the operation ran
    pub attempts: u32,
    /// Whether `value` passed the acceptance check
    pub accepted: bool,
}

/// Run `operation` until `accept` approves its value or attempts run out
///
/// Running out of attempts is not an error: the last value is returned with
/// `accepted == false`. An `Err` from the operation is returned at once.
/// Cancellation is observed only during the pauses between attempts.
pub async fn retry_until<F, Fut, T, A>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
    accept: A,
) -> Result<RetryOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    A: Fn(&T) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            sleep_or_cancel(cancel, policy.delay).await?;
        }
        attempt += 1;

        let value = operation().await?;
        if accept(&value) {
            if attempt > 1 {
                tracing::info!(label, attempts = attempt, "Operation succeeded after retry");
            }
            return Ok(RetryOutcome {
                value,
                attempts: attempt,
                accepted: true,
            });
        }

        if attempt >= max_attempts {
            return Ok(RetryOutcome {
                value,
                attempts: attempt,
                accepted: false,
            });
        }

        tracing::warn!(
            label,
            attempt,
            max_attempts,
            delay_ms = policy.delay.as_millis() as u64,
            "No usable result yet, retrying"
        );
    }
}

/// Sleep for `duration` unless the token is cancelled first
pub async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_accepted_first_time() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let outcome = retry_until(
            &quick(6),
            &CancellationToken::new(),
            "test",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                }
            },
            |v| *v == 7,
        )
        .await
        .unwrap();

        assert_eq!(outcome, RetryOutcome { value: 7, attempts: 1, accepted: true });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_accepted_on_sixth_attempt_stops() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let outcome = retry_until(
            &quick(6),
            &CancellationToken::new(),
            "test",
            || {
                let c = c.clone();
                async move { Ok(c.fetch_add(1, Ordering::SeqCst) + 1) }
            },
            |n| *n >= 6,
        )
        .await
        .unwrap();

        assert!(outcome.accepted);
        assert_eq!(outcome.attempts, 6);
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_exhausted_is_not_an_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let outcome = retry_until(
            &quick(6),
            &CancellationToken::new(),
            "test",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(Vec::<String>::new())
                }
            },
            |v| !v.is_empty(),
        )
        .await
        .unwrap();

        assert!(!outcome.accepted);
        assert!(outcome.value.is_empty());
        assert_eq!(outcome.attempts, 6);
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_error_aborts_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let result: Result<RetryOutcome<u32>> = retry_until(
            &quick(6),
            &CancellationToken::new(),
            "test",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(Error::ExternalTool("ssh exploded".into()))
                }
            },
            |_| true,
        )
        .await;

        assert!(matches!(result, Err(Error::ExternalTool(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_delay_before_first_attempt() {
        let policy = RetryPolicy::new(1, Duration::from_secs(3600));
        let start = std::time::Instant::now();
        let outcome = retry_until(
            &policy,
            &CancellationToken::new(),
            "test",
            || async { Ok(0) },
            |_| false,
        )
        .await
        .unwrap();
        assert_eq!(outcome.attempts, 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_during_pause() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(6, Duration::from_secs(3600));
        let trigger = cancel.clone();
        let result = retry_until(
            &policy,
            &cancel,
            "test",
            || {
                trigger.cancel();
                async { Ok(0) }
            },
            |_| false,
        )
        .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_sleep_or_cancel() {
        let cancel = CancellationToken::new();
        sleep_or_cancel(&cancel, Duration::from_millis(1)).await.unwrap();
        cancel.cancel();
        assert!(matches!(
            sleep_or_cancel(&cancel, Duration::from_secs(3600)).await,
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 6);
        assert_eq!(policy.delay, Duration::from_secs(3));
    }
}
