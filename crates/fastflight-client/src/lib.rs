//! The resilient pooled client: connection pool, retry engine, circuit breaker,
//! their composition, and the public async/blocking API surface.
//!
//! Every other crate that talks to a FastFlight server (the HTTP gateway, the CLI,
//! integration tests) goes through [`FastFlightClient`] rather than building its own
//! `tonic` channel, so pool/retry/breaker behavior is uniform across call sites.

pub mod breaker;
pub mod client;
pub mod pool;
pub mod resilience;
pub mod retry;

pub use breaker::{default_monitored_kinds, CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use client::{connect_with_blocking_bridge, BlockingBridge, FastFlightClient};
pub use pool::{ConnectionPool, FlightHandle};
pub use resilience::execute_with_resilience;
pub use retry::{delay_for_attempt, retry_with_config};
