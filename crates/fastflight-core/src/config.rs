//! Layered runtime configuration, loaded via the `config` crate from (in increasing
//! priority) built-in defaults, an optional config file, and `FASTFLIGHT_`-prefixed
//! environment variables (the latter typically populated from a `.env` file by
//! `dotenvy` at process start). Split into one struct per component, the way
//! the rest of this workspace is split into one crate per component.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ErrorKind, FastFlightError, Result};

fn default_host() -> String {
    "0.0.0.0".to_string()
}

/// Arrow Flight streaming server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FlightServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_flight_port")]
    pub port: u16,
    #[serde(default = "default_partition_threshold")]
    pub partition_threshold_rows: u64,
}

fn default_flight_port() -> u16 {
    8815
}

fn default_partition_threshold() -> u64 {
    1000
}

impl Default for FlightServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_flight_port(),
            partition_threshold_rows: default_partition_threshold(),
        }
    }
}

/// HTTP gateway settings: REST passthrough over the Flight server.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Accepted API keys. Empty means authentication is disabled, which is the
    /// default for local development (see DESIGN.md for the reasoning).
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default = "default_flight_endpoint")]
    pub flight_endpoint: String,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_flight_endpoint() -> String {
    "http://127.0.0.1:8815".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_gateway_port(),
            api_keys: Vec::new(),
            flight_endpoint: default_flight_endpoint(),
        }
    }
}

/// Connection pool and resilience (retry + circuit breaker) settings for
/// `fastflight-client`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientPoolConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

fn default_pool_size() -> usize {
    8
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

impl Default for ClientPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl ClientPoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Backoff shape used between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
    JitteredExponential,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::JitteredExponential
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub strategy: BackoffStrategy,
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,
    /// Uniform jitter applied to `JITTERED_EXPONENTIAL` as `+-jitter_factor * value`.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    /// Kinds a raised error must belong to for a retry to proceed. Transport and
    /// availability kinds default in; validation and auth failures are permanent
    /// and default out.
    #[serde(default = "default_retryable_kinds")]
    pub retryable_kinds: Vec<String>,
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_exponential_base() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.2
}

fn default_retryable_kinds() -> Vec<String> {
    vec![
        "Connection".to_string(),
        "Timeout".to_string(),
        "Unavailable".to_string(),
        "ResourceExhausted".to_string(),
        "DataService".to_string(),
    ]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            strategy: BackoffStrategy::default(),
            exponential_base: default_exponential_base(),
            jitter_factor: default_jitter_factor(),
            retryable_kinds: default_retryable_kinds(),
        }
    }
}

impl RetryConfig {
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable_kinds.iter().any(|k| k == kind.as_str())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(FastFlightError::new(ErrorKind::InvalidParam, "retry.max_attempts must be at least 1"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(FastFlightError::new(
                ErrorKind::InvalidParam,
                "retry.max_delay_ms must be >= retry.base_delay_ms",
            ));
        }
        if self.exponential_base <= 1.0 {
            return Err(FastFlightError::new(ErrorKind::InvalidParam, "retry.exponential_base must be > 1.0"));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(FastFlightError::new(ErrorKind::InvalidParam, "retry.jitter_factor must be in [0.0, 1.0]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_open_duration_ms")]
    pub open_duration_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_open_duration_ms() -> u64 {
    30_000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_duration_ms: default_open_duration_ms(),
        }
    }
}

impl BreakerConfig {
    pub fn open_duration(&self) -> Duration {
        Duration::from_millis(self.open_duration_ms)
    }
}

/// Time-series partitioner tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct PartitionerConfig {
    #[serde(default = "default_target_partition_rows")]
    pub target_partition_rows: u64,
    #[serde(default = "default_max_partitions")]
    pub max_partitions: usize,
    /// Ranges at or under this span skip partitioning entirely and run as a
    /// single request (the real-time short-circuit).
    #[serde(default = "default_real_time_threshold_secs")]
    pub real_time_threshold_secs: u64,
    #[serde(default)]
    pub preserve_order: bool,
}

fn default_target_partition_rows() -> u64 {
    250_000
}

fn default_max_partitions() -> usize {
    64
}

fn default_real_time_threshold_secs() -> u64 {
    3_600
}

impl Default for PartitionerConfig {
    fn default() -> Self {
        Self {
            target_partition_rows: default_target_partition_rows(),
            max_partitions: default_max_partitions(),
            real_time_threshold_secs: default_real_time_threshold_secs(),
            preserve_order: false,
        }
    }
}

impl PartitionerConfig {
    pub fn real_time_threshold(&self) -> Duration {
        Duration::from_secs(self.real_time_threshold_secs)
    }
}

/// Top-level settings, assembled by `load()` from defaults, an optional file, and
/// `FASTFLIGHT_`-prefixed environment variables (double underscore as the nested-key
/// separator, e.g. `FASTFLIGHT_CLIENT__RETRY__MAX_ATTEMPTS`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default)]
    pub flight_server: FlightServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub client: ClientPoolConfig,
    #[serde(default)]
    pub partitioner: PartitionerConfig,
}

fn default_env() -> String {
    "local".to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            env: default_env(),
            flight_server: FlightServerConfig::default(),
            gateway: GatewayConfig::default(),
            client: ClientPoolConfig::default(),
            partitioner: PartitionerConfig::default(),
        }
    }
}

impl AppSettings {
    /// Loads settings from (lowest to highest priority): struct defaults, an
    /// optional `config_file` (YAML/TOML/JSON, format inferred from extension), and
    /// `FASTFLIGHT_`-prefixed environment variables.
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FASTFLIGHT")
                .separator("__")
                .try_parsing(true),
        );

        let settings: AppSettings = builder
            .build()
            .map_err(|e| FastFlightError::with_source(ErrorKind::Internal, format!("loading config: {e}"), e.into()))?
            .try_deserialize()
            .map_err(|e| FastFlightError::with_source(ErrorKind::Internal, format!("parsing config: {e}"), e.into()))?;

        settings.client.retry.validate()?;
        Ok(settings)
    }
}
