//! Storage error types.

use std::time::Duration;

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Scan record not found.
    #[error("scan not found: {id}")]
    ScanNotFound { id: i64 },

    /// Insert rejected by the barcode uniqueness constraint.
    #[error("duplicate barcode: {barcode}")]
    DuplicateBarcode { barcode: String },

    /// Database connection error.
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    QueryError { message: String },

    /// Query exceeded its configured timeout.
    #[error("storage operation '{operation}' timed out after {timeout:?}")]
    QueryTimeout { operation: String, timeout: Duration },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Stored value could not be decoded.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// Health check failed.
    #[error("health check failed: {message}")]
    HealthCheckFailed { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Connection pool statistics reported by a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub active_connections: u32,
    pub idle_connections: u32,
    pub max_connections: u32,
}

/// Result of a storage health check.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the backend answered the probe.
    pub healthy: bool,
    /// Round-trip latency of the probe.
    pub latency: Duration,
    /// Pool statistics, for pooled backends.
    pub pool_stats: Option<PoolStats>,
    /// Backend name or diagnostic message.
    pub message: Option<String>,
}
