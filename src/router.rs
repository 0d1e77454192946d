use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use http::{header, HeaderValue, Method};
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{handlers, middleware_layer, state::AppState};

/// Request bodies here are small JSON documents.
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Builds the HTTP surface. Every route requires an identity.
///
/// Route layers run outermost-last, so the identity check is added after the
/// rate limiters that read it.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(50)
            .burst_size(200)
            .use_headers()
            .finish()
            .context("Invalid per-IP governor configuration")?,
    );

    let scan_routes = Router::new()
        .route("/api/scan", post(handlers::scan::submit_scan))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_scan,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_identity,
        ))
        .with_state(state.clone());

    let device_registration_routes = Router::new()
        .route("/api/devices", post(handlers::devices::register_device))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_device_registration,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_identity,
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/devices", get(handlers::devices::list_devices))
        .route("/api/sessions", post(handlers::sessions::open_session))
        .route(
            "/api/sessions/{session_id}/close",
            post(handlers::sessions::close_session),
        )
        .route(
            "/api/sessions/{session_id}/credential",
            get(handlers::sessions::current_credential),
        )
        .route(
            "/api/sessions/{session_id}/attendance",
            get(handlers::sessions::session_attendance),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_identity,
        ))
        .with_state(state.clone());

    let app = Router::new()
        .merge(scan_routes)
        .merge(device_registration_routes)
        .merge(protected_routes)
        .layer(tower_governor::GovernorLayer::new(governor_conf));

    Ok(with_transport_layers(app))
}

/// Wraps `router` in the layers every route shares.
///
/// From the outside in: CORS, the body size limit, cookies, tracing. The
/// per-IP governor is not part of this stack because it needs the peer
/// address from `into_make_service_with_connect_info`.
pub fn with_transport_layers(router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
            HeaderValue::from_static("http://[::1]:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::COOKIE,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    router.layer(
        ServiceBuilder::new()
            .layer(cors)
            .map_response(|res: http::Response<_>| res.map(axum::body::Body::new))
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(CookieManagerLayer::new())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::default().include_headers(false))
                    .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                    .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                    .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
            ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    fn echo_router() -> Router {
        with_transport_layers(Router::new().route(
            "/echo",
            post(|body: String| async move { body.len().to_string() }),
        ))
    }

    #[tokio::test]
    async fn test_small_body_passes_through() {
        let response = echo_router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/echo")
                    .body(Body::from("{\"raw\":\"x\"}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_oversized_body_is_refused() {
        let response = echo_router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/echo")
                    .body(Body::from(vec![b'a'; MAX_BODY_BYTES + 1]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_preflight_from_known_origin() {
        let response = echo_router()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/echo")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
    }
}
