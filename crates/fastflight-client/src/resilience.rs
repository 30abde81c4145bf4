//! Execution composition: wraps a call in the circuit breaker, then wraps that
//! in the retry engine, so a retried call re-enters the breaker on every
//! attempt and sustained upstream failure is correctly reflected in breaker state.

use std::sync::Arc;

use fastflight_core::{ClientPoolConfig, FastFlightError};

use crate::breaker::{default_monitored_kinds, CircuitBreaker, CircuitBreakerRegistry};
use crate::retry::retry_with_config;

/// Runs `call` under the named circuit breaker (created lazily in `registry`) and
/// the pool's retry policy. `call` is invoked fresh on every retry attempt, and
/// each attempt passes through the breaker independently.
pub async fn execute_with_resilience<F, Fut, T>(config: &ClientPoolConfig, registry: &CircuitBreakerRegistry, circuit_name: &str, mut call: F) -> Result<T, FastFlightError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, FastFlightError>>,
{
    let breaker: Arc<CircuitBreaker> = registry.get_or_create(circuit_name, &config.breaker, &default_monitored_kinds());

    retry_with_config(&config.retry, || {
        let breaker = breaker.clone();
        async { breaker.call(|| call()).await }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastflight_core::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn a_retried_call_re_enters_the_breaker_each_attempt() {
        let mut config = ClientPoolConfig::default();
        config.retry.max_attempts = 5;
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 5;
        config.retry.retryable_kinds = vec!["Connection".to_string()];
        config.breaker.failure_threshold = 2;

        let registry = CircuitBreakerRegistry::new();
        let calls = AtomicU32::new(0);

        let err = execute_with_resilience(&config, &registry, "test-backend", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(FastFlightError::new(ErrorKind::Connection, "boom")) }
        })
        .await
        .unwrap_err();

        // Breaker opens after 2 failures; remaining attempts are rejected as
        // CircuitOpen (not retryable), so the final error is the breaker's, not a
        // RetryExhausted wrapping the last Connection failure.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.kind, ErrorKind::CircuitOpen);
    }
}
