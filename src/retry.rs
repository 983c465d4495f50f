// Retry helper shared by the scan and completion clients.
//
// Only ever wraps idempotent resends: the closure must send the same request
// (same transaction id) on every attempt.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self::immediate(0)
    }

    /// Retry straight away, without sleeping.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_interval: Duration::ZERO,
            multiplier: 1.0,
            max_interval: Duration::ZERO,
        }
    }

    /// Doubling backoff starting at `initial_interval`.
    pub fn exponential(max_retries: u32, initial_interval: Duration) -> Self {
        Self {
            max_retries,
            initial_interval,
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_millis((delay.as_millis() as f64 * self.multiplier) as u64).min(self.max_interval)
    }
}

pub async fn retry_with_backoff<F, Fut, T, E, P>(
    operation_name: &str,
    policy: RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut retry_count = 0;
    let mut delay = policy.initial_interval;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) && retry_count < policy.max_retries => {
                retry_count += 1;
                warn!(
                    operation = operation_name,
                    attempt = retry_count,
                    max_retries = policy.max_retries,
                    ?delay,
                    error = %e,
                    "Call failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                delay = policy.next_delay(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, String> = retry_with_backoff(
            "test",
            RetryPolicy::immediate(2),
            |_| true,
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err("down".to_string()) } else { Ok(n) }
            },
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = retry_with_backoff(
            "test",
            RetryPolicy::immediate(1),
            |_| true,
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = retry_with_backoff(
            "test",
            RetryPolicy::immediate(3),
            |e: &String| e != "auth",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("auth".to_string())
            },
        )
        .await;

        assert_eq!(result, Err("auth".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_sleeps_between_attempts() {
        let start = tokio::time::Instant::now();
        let result: Result<(), String> = retry_with_backoff(
            "test",
            RetryPolicy::exponential(3, Duration::from_secs(1)),
            |_| true,
            move || async move { Err("down".to_string()) },
        )
        .await;

        assert!(result.is_err());
        // 1s + 2s + 4s
        assert!(start.elapsed() >= Duration::from_secs(7));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::exponential(10, Duration::from_secs(20));
        assert_eq!(policy.next_delay(Duration::from_secs(20)), Duration::from_secs(30));
    }
}
