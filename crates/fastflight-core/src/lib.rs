//! Shared foundation for FastFlight: the error taxonomy, the parameter model, the
//! service contract every backend implements, the tag registry that binds the two
//! together, and the layered configuration every binary loads at startup.
//!
//! Every other crate in this workspace depends on `fastflight-core` and nothing
//! else depends on them; it has no knowledge of Arrow Flight, HTTP, or any
//! particular backend.

pub mod config;
pub mod error;
pub mod param;
pub mod registry;
pub mod service;

pub use config::{AppSettings, BackoffStrategy, BreakerConfig, ClientPoolConfig, FlightServerConfig, GatewayConfig, PartitionerConfig, RetryConfig};
pub use error::{ErrorKind, FastFlightError, Result};
pub use param::{ParamTag, Parameter, SampleParams, SqlQueryParams, TimeRangeParams};
pub use registry::Registry;
pub use service::{Batch, BatchIter, BatchSizeHint, BatchStream, ServiceHandler};
