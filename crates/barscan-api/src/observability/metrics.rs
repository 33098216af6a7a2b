//! Prometheus metrics exposition.
//!
//! Metrics are recorded through the `metrics` facade all over the workspace
//! and rendered here by `metrics-exporter-prometheus`.
//!
//! # Metrics Exposed
//!
//! - `barscan_http_requests_total` / `barscan_http_request_duration_seconds`
//! - `barscan_scans_created_total` - create outcomes, `outcome=created|duplicate`
//! - `barscan_storage_query_duration_seconds` / `barscan_storage_query_timeout_total`
//! - `barscan_storage_health_check_duration_seconds`
//! - `barscan_storage_pool_connections`

use std::sync::Arc;

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Prometheus exposition format content type.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handle used by the `/metrics` endpoint.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Renders the current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: {0}")]
    Install(String),
}

/// Installs the global Prometheus recorder.
///
/// Call once at startup, before anything is recorded.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_metrics();

    Ok(MetricsState::new(handle))
}

fn describe_metrics() {
    metrics::describe_counter!(
        "barscan_http_requests_total",
        "Total number of HTTP requests"
    );
    metrics::describe_histogram!(
        "barscan_http_request_duration_seconds",
        metrics::Unit::Seconds,
        "HTTP request duration"
    );
    metrics::describe_counter!(
        "barscan_scans_created_total",
        "Create requests by outcome (created or duplicate)"
    );
    metrics::describe_histogram!(
        "barscan_storage_query_duration_seconds",
        metrics::Unit::Seconds,
        "Storage query duration by operation, backend and status"
    );
    metrics::describe_counter!(
        "barscan_storage_query_timeout_total",
        "Storage queries that exceeded their timeout"
    );
    metrics::describe_histogram!(
        "barscan_storage_health_check_duration_seconds",
        metrics::Unit::Seconds,
        "Storage health check duration by backend and status"
    );
    metrics::describe_gauge!(
        "barscan_storage_pool_connections",
        "Database pool connections by backend and state (active, idle, max)"
    );
}

/// Handler for `GET /metrics`.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.render())
}
