//! The retry engine: computes per-attempt delays for the four backoff
//! strategies and drives a fallible async call through up to `max_attempts`,
//! wrapping the last failure in `RetryExhausted` once exhausted.

use std::time::Duration;

use fastflight_core::{BackoffStrategy, ErrorKind, FastFlightError, RetryConfig};
use rand::Rng;
use tracing::{debug, warn};

/// The delay before attempt `n` (1-indexed), clamped to `config.max_delay_ms`.
pub fn delay_for_attempt(config: &RetryConfig, n: u32) -> Duration {
    let base = config.base_delay_ms as f64;
    let raw_ms = match config.strategy {
        BackoffStrategy::Fixed => base,
        BackoffStrategy::Linear => base * n as f64,
        BackoffStrategy::Exponential => base * config.exponential_base.powi(n as i32 - 1),
        BackoffStrategy::JitteredExponential => {
            let value = base * config.exponential_base.powi(n as i32 - 1);
            let jitter_span = value * config.jitter_factor;
            let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
            value + jitter
        }
    };
    let clamped_ms = raw_ms.max(0.0).min(config.max_delay_ms as f64);
    Duration::from_millis(clamped_ms as u64)
}

/// Drives `call` through up to `config.max_attempts` attempts, sleeping
/// `delay_for_attempt` between retries. Only retries when the failure's kind is in
/// `config.retryable_kinds`; any other error (or attempt exhaustion) is returned
/// immediately, the latter wrapped in `RetryExhausted`.
pub async fn retry_with_config<F, Fut, T>(config: &RetryConfig, mut call: F) -> Result<T, FastFlightError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, FastFlightError>>,
{
    let mut attempt: u32 = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = config.is_retryable(err.kind);
                let attempts_left = (attempt as usize) < config.max_attempts;
                if !retryable || !attempts_left {
                    if retryable {
                        warn!(attempts = attempt, kind = %err.kind, "retry attempts exhausted");
                        return Err(FastFlightError::retry_exhausted(attempt as usize, err));
                    }
                    return Err(err);
                }
                let delay = delay_for_attempt(config, attempt);
                debug!(attempt, kind = %err.kind, ?delay, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fixed_config(strategy: BackoffStrategy) -> RetryConfig {
        let mut c = RetryConfig::default();
        c.strategy = strategy;
        c.base_delay_ms = 10;
        c.max_delay_ms = 1_000;
        c.retryable_kinds = vec!["Connection".to_string()];
        c
    }

    #[test]
    fn fixed_delay_is_constant() {
        let c = fixed_config(BackoffStrategy::Fixed);
        assert_eq!(delay_for_attempt(&c, 1), Duration::from_millis(10));
        assert_eq!(delay_for_attempt(&c, 5), Duration::from_millis(10));
    }

    #[test]
    fn linear_delay_grows_by_base_each_attempt() {
        let c = fixed_config(BackoffStrategy::Linear);
        assert_eq!(delay_for_attempt(&c, 1), Duration::from_millis(10));
        assert_eq!(delay_for_attempt(&c, 3), Duration::from_millis(30));
    }

    #[test]
    fn exponential_delay_doubles_by_default() {
        let c = fixed_config(BackoffStrategy::Exponential);
        assert_eq!(delay_for_attempt(&c, 1), Duration::from_millis(10));
        assert_eq!(delay_for_attempt(&c, 2), Duration::from_millis(20));
        assert_eq!(delay_for_attempt(&c, 3), Duration::from_millis(40));
    }

    #[test]
    fn delays_are_clamped_to_max_delay() {
        let mut c = fixed_config(BackoffStrategy::Exponential);
        c.max_delay_ms = 25;
        assert_eq!(delay_for_attempt(&c, 5), Duration::from_millis(25));
    }

    #[tokio::test]
    async fn retries_up_to_max_attempts_then_wraps_in_retry_exhausted() {
        let mut c = fixed_config(BackoffStrategy::Fixed);
        c.max_attempts = 3;
        let calls = AtomicU32::new(0);

        let err = retry_with_config(&c, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(FastFlightError::new(ErrorKind::Connection, "boom")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.kind, ErrorKind::RetryExhausted);
        assert_eq!(err.last_kind, Some(ErrorKind::Connection));
    }

    #[tokio::test]
    async fn non_retryable_kinds_fail_immediately() {
        let c = fixed_config(BackoffStrategy::Fixed);
        let calls = AtomicU32::new(0);

        let err = retry_with_config(&c, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(FastFlightError::new(ErrorKind::InvalidParam, "bad")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind, ErrorKind::InvalidParam);
    }

    #[tokio::test]
    async fn succeeds_without_retry_when_the_first_attempt_succeeds() {
        let c = fixed_config(BackoffStrategy::Fixed);
        let result = retry_with_config(&c, || async { Ok::<_, FastFlightError>(42) }).await.unwrap();
        assert_eq!(result, 42);
    }
}
