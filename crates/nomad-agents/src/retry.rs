//! Exponential backoff around remote calls.

use std::future::Future;
use std::time::Duration;

use nomad_common::{Error, Result};
use tracing::warn;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: f64) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0, 1.0)
    }

    /// Sleep before retrying after the failed attempt with 0-based index
    /// `attempt`: `backoff_base^attempt` seconds.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(self.backoff_base.powi(exp))
            .map(|d| d.min(MAX_BACKOFF))
            .unwrap_or(MAX_BACKOFF)
    }

    /// Run `operation`, retrying errors that [`Error::is_retryable`] accepts.
    pub async fn execute<T, F, Fut>(&self, label: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_with_backoff(label, *self, Error::is_retryable, operation).await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, 2.0)
    }
}

/// Run `operation` up to `policy.max_retries + 1` times.
///
/// Errors rejected by `retryable` are returned immediately without sleeping.
/// When every attempt fails the last error is returned unchanged.
pub async fn retry_with_backoff<T, F, Fut, R>(
    label: &str,
    policy: RetryPolicy,
    retryable: R,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !retryable(&err) => return Err(err),
            Err(err) if attempt >= policy.max_retries => {
                warn!(
                    operation = label,
                    attempts = attempt + 1,
                    error = %err,
                    "giving up after final attempt"
                );
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation = label,
                    attempt = attempt + 1,
                    max_attempts = policy.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[test]
    fn delays_grow_with_attempt() {
        let policy = RetryPolicy::new(3, 2.0);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(40), MAX_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_makes_max_retries_plus_one_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let result: Result<()> = RetryPolicy::new(3, 2.0)
            .execute("stt", || {
                let calls = Arc::clone(&calls);
                let stamps = Arc::clone(&stamps);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    stamps.lock().unwrap().push(start.elapsed());
                    Err(Error::Transport(format!("connection reset #{n}")))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // the last error is surfaced unchanged
        match result {
            Err(Error::Transport(msg)) => assert_eq!(msg, "connection reset #3"),
            other => panic!("unexpected result: {other:?}"),
        }

        let stamps = stamps.lock().unwrap();
        let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps.len(), 3);
        assert!(gaps.windows(2).all(|w| w[1] > w[0]), "gaps {gaps:?}");
        assert!(gaps[0] >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let value = RetryPolicy::new(2, 2.0)
            .execute("completion", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::Upstream {
                            status: 502,
                            message: "bad gateway".into(),
                        })
                    } else {
                        Ok("answer")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_propagates_without_sleeping() {
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let result: Result<()> = RetryPolicy::new(3, 2.0)
            .execute("completion", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Schema {
                        status: 400,
                        message: "bad tools".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Schema { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_predicate_controls_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result: Result<()> = retry_with_backoff(
            "tts",
            RetryPolicy::new(2, 1.5),
            |_| false,
            || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Timeout("slow".into()))
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
