//! The HTTP gateway: re-exposes the Arrow Flight streaming server as plain
//! HTTP, for callers that would rather POST a ticket and read back raw Arrow
//! IPC bytes than speak gRPC. Built on `axum` + `tower`, the ecosystem's
//! standard web stack, the way the rest of this workspace favors it over a
//! bespoke one.

mod auth;
mod routes;
mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::GatewayState;

/// Builds the full gateway router: `/health` and `/metrics` are unauthenticated
/// (a health check gated by the same key it reports on would be useless to an
/// orchestrator), everything else requires `X-API-Key` when `state.config.api_keys`
/// is non-empty.
pub fn router(state: GatewayState) -> Router {
    let protected = Router::new()
        .route("/do_get", post(routes::do_get))
        .route("/params", get(routes::list_params))
        .route_layer(middleware::from_fn_with_state(state.config.clone(), auth::require_api_key));

    Router::new()
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the gateway on `state.config.host:state.config.port` and serves until
/// the process is signalled to stop.
pub async fn serve(state: GatewayState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    tracing::info!(%addr, "starting FastFlight HTTP gateway");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;

    tracing::warn!("FastFlight HTTP gateway stopped serving");
    Ok(())
}
