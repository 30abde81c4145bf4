//! Shared axum router state: the pooled client the gateway forwards through, the
//! registry it lists tags from, and the gateway's own config (auth, routing).

use std::sync::Arc;

use fastflight_client::FastFlightClient;
use fastflight_core::{GatewayConfig, Registry};
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct GatewayState {
    pub client: Arc<FastFlightClient>,
    pub registry: Arc<Registry>,
    pub config: GatewayConfig,
    /// Set when the process installed a Prometheus recorder (spec: "GET /metrics
    /// (when enabled)"); `None` makes the route answer 404 instead of panicking.
    pub metrics_handle: Option<PrometheusHandle>,
}

impl GatewayState {
    pub fn new(client: Arc<FastFlightClient>, registry: Arc<Registry>, config: GatewayConfig, metrics_handle: Option<PrometheusHandle>) -> Self {
        Self { client, registry, config, metrics_handle }
    }
}
