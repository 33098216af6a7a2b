//! Helpers shared by the sqlx-backed stores.

use std::future::Future;
use std::time::{Duration, Instant};

use sqlx::{Database, Pool};

use crate::error::{PoolStats, StorageError, StorageResult};

/// Wraps an async operation with a timeout and records metrics.
///
/// # Metrics
/// - `barscan_storage_query_duration_seconds` - Histogram of query durations
/// - `barscan_storage_query_timeout_total` - Counter of timeout events
pub(crate) async fn execute_with_timeout<T, F>(
    backend: &'static str,
    operation: &str,
    timeout: Duration,
    future: F,
) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    let start = Instant::now();
    let result = tokio::time::timeout(timeout, future).await;
    let duration = start.elapsed().as_secs_f64();

    let (status, final_result) = match result {
        Ok(Ok(value)) => ("success", Ok(value)),
        Ok(Err(e)) => ("error", Err(e)),
        Err(_elapsed) => (
            "timeout",
            Err(StorageError::QueryTimeout {
                operation: operation.to_string(),
                timeout,
            }),
        ),
    };

    metrics::histogram!(
        "barscan_storage_query_duration_seconds",
        "operation" => operation.to_string(),
        "backend" => backend,
        "status" => status
    )
    .record(duration);

    if status == "timeout" {
        metrics::counter!(
            "barscan_storage_query_timeout_total",
            "operation" => operation.to_string(),
            "backend" => backend
        )
        .increment(1);
    }

    final_result
}

/// Maps an insert failure, turning a uniqueness violation into `DuplicateBarcode`.
pub(crate) fn map_insert_error(err: sqlx::Error, barcode: &str) -> StorageError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return StorageError::DuplicateBarcode {
                barcode: barcode.to_string(),
            };
        }
    }
    StorageError::QueryError {
        message: format!("Failed to insert scan: {err}"),
    }
}

/// Wraps a query failure with the operation that produced it.
pub(crate) fn query_error(context: &str) -> impl FnOnce(sqlx::Error) -> StorageError + '_ {
    move |e| StorageError::QueryError {
        message: format!("{context}: {e}"),
    }
}

/// Wraps a column decode failure.
pub(crate) fn decode_error(e: sqlx::Error) -> StorageError {
    StorageError::SerializationError {
        message: format!("Failed to decode scan row: {e}"),
    }
}

/// Snapshot of pool usage, also published as gauges.
pub(crate) fn pool_stats<DB: Database>(pool: &Pool<DB>, backend: &'static str) -> PoolStats {
    // pool.size() is the total, so active = size - idle
    let total_connections = pool.size();
    let idle_connections = pool.num_idle() as u32;
    let active_connections = total_connections.saturating_sub(idle_connections);
    let max_connections = pool.options().get_max_connections();

    for (state, value) in [
        ("active", active_connections),
        ("idle", idle_connections),
        ("max", max_connections),
    ] {
        metrics::gauge!(
            "barscan_storage_pool_connections",
            "backend" => backend,
            "state" => state
        )
        .set(value as f64);
    }

    PoolStats {
        active_connections,
        idle_connections,
        max_connections,
    }
}

/// Records the outcome of a health probe.
pub(crate) fn record_health_check(backend: &'static str, status: &'static str, latency: Duration) {
    metrics::histogram!(
        "barscan_storage_health_check_duration_seconds",
        "backend" => backend,
        "status" => status
    )
    .record(latency.as_secs_f64());
}
