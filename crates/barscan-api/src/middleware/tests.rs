//! Middleware stack tests.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use barscan_server::config::CorsSettings;
use tower::ServiceExt;

use super::*;

/// Test app with the production layer order.
///
/// The last `.layer()` call is outermost, so the request id is assigned
/// before metrics and logging see the request.
fn test_app_with_middleware(metrics: Arc<RequestMetrics>) -> Router {
    Router::new()
        .route("/", get(|| async { "OK" }))
        .route(
            "/echo-id",
            get(|req: Request<Body>| async move {
                request_id_of(req.headers())
                    .unwrap_or("missing")
                    .to_string()
            }),
        )
        .route(
            "/error",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .route(
            "/invalid",
            get(|| async { StatusCode::UNPROCESSABLE_ENTITY }),
        )
        .layer(RequestLoggingLayer::new())
        .layer(MetricsLayer::new(metrics))
        .layer(RequestIdLayer::new())
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn response_request_id(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(REQUEST_ID_HEADER)
        .expect("response should carry x-request-id")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_request_logging_passes_responses_through() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let app = test_app_with_middleware(Arc::new(RequestMetrics::new()));

    let response = app.clone().oneshot(get_request("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get_request("/error")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_metrics_are_collected() {
    let metrics = Arc::new(RequestMetrics::new());
    let app = test_app_with_middleware(Arc::clone(&metrics));

    assert_eq!(metrics.request_count(), 0);

    app.clone().oneshot(get_request("/")).await.unwrap();
    app.clone().oneshot(get_request("/")).await.unwrap();
    assert_eq!(metrics.request_count(), 2);
    assert_eq!(metrics.success_count(), 2);

    let response = app.clone().oneshot(get_request("/error")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(metrics.server_error_count(), 1);

    let response = app.oneshot(get_request("/invalid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(metrics.client_error_count(), 1);
    assert_eq!(metrics.request_count(), 4);
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let app = test_app_with_middleware(Arc::new(RequestMetrics::new()));

    let response = app.oneshot(get_request("/echo-id")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let id = response_request_id(&response);
    assert!(uuid::Uuid::parse_str(&id).is_ok(), "not a uuid: {id}");

    // The handler saw the same id that was echoed back.
    let body = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    assert_eq!(body, id.as_bytes());
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = test_app_with_middleware(Arc::new(RequestMetrics::new()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/echo-id")
                .header(REQUEST_ID_HEADER, "scanner-7f3a")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response_request_id(&response), "scanner-7f3a");
}

#[tokio::test]
async fn test_oversized_request_id_is_replaced() {
    let app = test_app_with_middleware(Arc::new(RequestMetrics::new()));
    let long_id = "x".repeat(MAX_REQUEST_ID_LENGTH + 1);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header(REQUEST_ID_HEADER, long_id.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let id = response_request_id(&response);
    assert_ne!(id, long_id);
    assert!(uuid::Uuid::parse_str(&id).is_ok());
}

#[tokio::test]
async fn test_cors_allows_any_origin_by_default() {
    let app = Router::new()
        .route("/", get(|| async { "OK" }))
        .layer(cors_layer(&CorsSettings::default()));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/")
                .header("Origin", "http://scanner.local")
                .header("Access-Control-Request-Method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header("Origin", "http://scanner.local")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_cors_restricts_to_configured_origins() {
    let settings = CorsSettings {
        allowed_origins: vec!["http://allowed.example".to_string()],
    };
    let app = Router::new()
        .route("/", get(|| async { "OK" }))
        .layer(cors_layer(&settings));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("Origin", "http://allowed.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "http://allowed.example"
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header("Origin", "http://other.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(!response
        .headers()
        .contains_key("access-control-allow-origin"));
}
