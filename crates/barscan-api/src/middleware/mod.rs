//! API middleware.
//!
//! Includes:
//! - Request id generation and propagation
//! - Request logging
//! - Metrics collection
//! - CORS configuration

mod logging;
mod metrics;
mod request_id;

pub use logging::{RequestLoggingLayer, HTTP_LOG_TARGET};
pub use metrics::{status_class, MetricsLayer, RequestMetrics};
pub use request_id::{request_id_of, RequestIdLayer, MAX_REQUEST_ID_LENGTH, REQUEST_ID_HEADER};

use axum::http::HeaderValue;
use barscan_server::config::CorsSettings;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

/// Creates the CORS layer for the configured origins.
///
/// `"*"` anywhere in the list allows every origin. Entries that are not
/// valid header values are skipped with a warning.
pub fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    if settings.allowed_origins.iter().any(|o| o.trim() == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = settings
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests;
