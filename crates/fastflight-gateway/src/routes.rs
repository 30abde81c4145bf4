//! Route handlers: the byte-stream passthrough, tag listing, health check, and
//! Prometheus metrics export.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use fastflight_core::FastFlightError;
use futures::TryStreamExt;
use serde_json::json;

use crate::state::GatewayState;

/// Wraps [`FastFlightError`] so `?` in handlers produces the gateway's
/// `{"detail": "..."}` error shape (SUPPLEMENT #2: "global exception handler").
pub struct ApiError(FastFlightError);

impl From<FastFlightError> for ApiError {
    fn from(e: FastFlightError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "detail": self.0.details }))).into_response()
    }
}

/// `POST {prefix}/do_get`: forwards the raw request body as ticket bytes through
/// `FastFlightClient::get_byte_stream`, streaming the Arrow IPC response back
/// without buffering it in memory. The body is the same JSON a caller would
/// otherwise hand the Flight server directly as a `Ticket.ticket` payload.
pub async fn do_get(State(state): State<GatewayState>, ticket_bytes: Bytes) -> Result<Response, ApiError> {
    let byte_stream = state.client.get_byte_stream(ticket_bytes.to_vec()).await?;
    let body = Body::from_stream(byte_stream.map_err(|e: FastFlightError| std::io::Error::other(e)));

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/vnd.apache.arrow.stream")],
        body,
    )
        .into_response())
}

/// `GET {prefix}/params`: lists every tag currently bound in the registry.
pub async fn list_params(State(state): State<GatewayState>) -> Json<Vec<&'static str>> {
    Json(state.registry.tags())
}

/// `GET /health`: a static liveness probe (SUPPLEMENT #3: original `/` route).
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /metrics`: Prometheus text exposition, when a recorder was installed at
/// startup. Answers 404 rather than panicking when metrics are disabled, since
/// disabling them is a normal deployment choice, not an error.
pub async fn metrics(State(state): State<GatewayState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "detail": "metrics are not enabled" }))).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router;
    use axum::body::Body as AxumBody;
    use fastflight_client::{ConnectionPool, FastFlightClient};
    use fastflight_core::{ClientPoolConfig, GatewayConfig, ParamTag, Registry};
    use std::sync::Arc;
    use tower::ServiceExt;

    /// A client over an empty, never-dialing pool: fine for exercising routes
    /// (health, params, metrics) that never acquire a connection.
    async fn dead_client() -> Arc<FastFlightClient> {
        let pool = ConnectionPool::from_handles(vec![]).await;
        Arc::new(FastFlightClient::from_pool(pool, ClientPoolConfig::default(), "test"))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let registry = Arc::new(Registry::new());
        let state = GatewayState::new(dead_client().await, registry, GatewayConfig::default(), None);
        let app = router(state);

        let response = app
            .oneshot(axum::http::Request::builder().uri("/health").body(AxumBody::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_disabled_is_not_found() {
        let registry = Arc::new(Registry::new());
        let state = GatewayState::new(dead_client().await, registry, GatewayConfig::default(), None);
        let app = router(state);

        let response = app
            .oneshot(axum::http::Request::builder().uri("/metrics").body(AxumBody::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn params_lists_registered_tags() {
        let registry = Arc::new(Registry::new());
        registry
            .register::<fastflight_core::SampleParams, _, _>(|| fastflight_services::EchoService)
            .unwrap();
        let state = GatewayState::new(dead_client().await, registry, GatewayConfig::default(), None);
        let app = router(state);

        let response = app
            .oneshot(axum::http::Request::builder().uri("/params").body(AxumBody::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let tags: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(tags, vec![fastflight_core::SampleParams::TAG]);
    }
}
