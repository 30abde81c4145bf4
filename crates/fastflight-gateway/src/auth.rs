//! API-key authentication middleware, in the style of an `X-API-Key` header
//! dependency. An empty configured key list means authentication is disabled
//! (see DESIGN.md for the Open Question this resolves).

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use fastflight_core::GatewayConfig;

pub const API_KEY_HEADER: &str = "x-api-key";

pub async fn require_api_key(State(config): State<GatewayConfig>, headers: HeaderMap, request: axum::extract::Request, next: Next) -> Response {
    if config.api_keys.is_empty() {
        return next.run(request).await;
    }

    let Some(provided) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) else {
        return error_response(StatusCode::UNAUTHORIZED, "Not authenticated: X-API-Key header is missing.");
    };

    if !config.api_keys.iter().any(|key| key == provided) {
        return error_response(StatusCode::FORBIDDEN, "Could not validate credentials: invalid API key.");
    }

    next.run(request).await
}

fn error_response(status: StatusCode, detail: &str) -> Response {
    (status, axum::Json(serde_json::json!({ "detail": detail }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn router(api_keys: Vec<String>) -> Router {
        let config = GatewayConfig { api_keys, ..GatewayConfig::default() };
        Router::new()
            .route("/protected", get(|| async { "ok" }))
            .route_layer(axum::middleware::from_fn_with_state(config.clone(), require_api_key))
            .with_state(config)
    }

    #[tokio::test]
    async fn empty_key_list_disables_auth() {
        let app = router(vec![]);
        let response = app.oneshot(axum::http::Request::builder().uri("/protected").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_header_is_unauthenticated() {
        let app = router(vec!["secret".to_string()]);
        let response = app.oneshot(axum::http::Request::builder().uri("/protected").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_key_is_forbidden() {
        let app = router(vec!["secret".to_string()]);
        let response = app
            .oneshot(axum::http::Request::builder().uri("/protected").header(API_KEY_HEADER, "wrong").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn correct_key_is_admitted() {
        let app = router(vec!["secret".to_string()]);
        let response = app
            .oneshot(axum::http::Request::builder().uri("/protected").header(API_KEY_HEADER, "secret").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
