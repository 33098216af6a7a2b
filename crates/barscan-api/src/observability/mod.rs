//! Observability for the barscan server.
//!
//! - Structured logging via `tracing-subscriber`
//! - Prometheus metrics exposition

mod logging;
mod metrics;

pub use logging::{init_logging, json_subscriber, parse_log_level};
pub use metrics::{init_metrics, metrics_handler, MetricsError, MetricsState, PROMETHEUS_CONTENT_TYPE};
