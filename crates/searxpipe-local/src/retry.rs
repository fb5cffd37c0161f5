use searxpipe_core::{Result, Settings};
use std::future::Future;
use std::time::Duration;

/// Bounded-retry strategy with exponential backoff.
///
/// `max_attempts` counts the first try; `base_delay` doubles per failed
/// attempt. Decoupled from what it retries: callers pass any operation that
/// performs exactly one attempt and fails with a classified error.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.max_retries,
            base_delay: settings.retry_delay,
        }
    }

    /// Backoff before retrying after failed attempt `attempt_index`
    /// (starting at 0): `base_delay * 2^attempt_index`.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt_index.min(16))
    }
}

/// Run `op` up to `policy.max_attempts` times.
///
/// Transient failures back off and retry; the last attempt's error is
/// surfaced without a trailing sleep. Permanent failures return immediately
/// without consuming retries.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use searxpipe_core::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_then_success() {
        // Fails transiently exactly twice, then succeeds: 3 invocations.
        let calls = AtomicU32::new(0);
        let out = with_retry(policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Timeout("slow".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_exhaustion_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let out: Result<()> = with_retry(policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Connect("refused".into())) }
        })
        .await;
        assert!(matches!(out, Err(Error::Connect(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let out: Result<()> = with_retry(policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::HttpStatus(404)) }
        })
        .await;
        assert!(matches!(out, Err(Error::HttpStatus(404))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_needs_one_attempt() {
        let calls = AtomicU32::new(0);
        let out = with_retry(policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42u32) }
        })
        .await;
        assert_eq!(out.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_delays_strictly_increase() {
        let p = policy(5);
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(2), Duration::from_millis(400));
        assert!(p.delay_for(0) < p.delay_for(1));
        assert!(p.delay_for(1) < p.delay_for(2));
    }

    #[test]
    fn backoff_shift_saturates() {
        let p = RetryPolicy {
            max_attempts: 100,
            base_delay: Duration::from_secs(1),
        };
        // Large attempt indexes must not overflow the shift.
        let _ = p.delay_for(64);
    }
}
