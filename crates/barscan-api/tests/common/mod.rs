//! Shared helpers for barscan API integration tests.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use barscan_api::http::{create_router, AppState};
use barscan_storage::ScanStore;
use serde_json::Value;
use tower::ServiceExt;

/// Number of concurrent clients submitting the same barcode.
pub const CONCURRENT_CLIENT_COUNT: usize = 50;

/// Creates a router over the given storage.
///
/// Each call builds a fresh `AppState` around the shared storage, which is
/// how the `oneshot` tests below simulate independent clients.
pub fn create_test_app<S: ScanStore>(storage: &Arc<S>) -> Router {
    create_router(AppState::new(Arc::clone(storage)))
}

async fn into_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    into_json(response).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    into_json(response).await
}

pub async fn delete_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    into_json(response).await
}

/// Fetches raw bytes and headers for non-JSON endpoints.
pub async fn get_raw(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}
