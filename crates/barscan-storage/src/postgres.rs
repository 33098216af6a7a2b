//! PostgreSQL storage implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};

use crate::error::{HealthStatus, StorageError, StorageResult};
use crate::sql::{
    decode_error, execute_with_timeout, map_insert_error, pool_stats, query_error,
    record_health_check,
};
use crate::traits::{
    contains_pattern, to_sql_i64, validate_new_scan, NewScan, Page, ScanFilter, ScanStore,
    StoredScan,
};

const BACKEND: &str = "postgres";

/// Default health check timeout in seconds.
/// Uses a shorter timeout than regular queries since health checks should be fast.
const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Default query timeout in seconds.
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

const SCAN_COLUMNS: &str = "id, barcode, scanned_at, notes";

/// Parse a database row into a StoredScan.
fn row_to_stored_scan(row: PgRow) -> StorageResult<StoredScan> {
    Ok(StoredScan {
        id: row.try_get("id").map_err(decode_error)?,
        barcode: row.try_get("barcode").map_err(decode_error)?,
        scanned_at: row.try_get("scanned_at").map_err(decode_error)?,
        notes: row.try_get("notes").map_err(decode_error)?,
    })
}

/// Append the filter as a WHERE clause.
/// Shared between count_scans and list_scans.
fn apply_scan_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ScanFilter) {
    builder.push(" WHERE 1 = 1");

    if let Some(ref needle) = filter.barcode_contains {
        builder.push(" AND barcode LIKE ");
        builder.push_bind(contains_pattern(needle));
        builder.push(" ESCAPE '\\'");
    }

    if let Some(from) = filter.scanned_from {
        builder.push(" AND scanned_at >= ");
        builder.push_bind(from);
    }

    if let Some(until) = filter.scanned_until {
        builder.push(" AND scanned_at <= ");
        builder.push_bind(until);
    }
}

/// PostgreSQL configuration options.
#[derive(Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    pub min_connections: u32,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Maximum time a single query may run before `StorageError::QueryTimeout`.
    pub query_timeout_secs: u64,
    /// Timeout for health checks in seconds.
    pub health_check_timeout_secs: u64,
}

// Custom Debug implementation to hide credentials in database_url
impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("health_check_timeout_secs", &self.health_check_timeout_secs)
            .finish()
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/barscan".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            health_check_timeout_secs: DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
        }
    }
}

/// PostgreSQL implementation of ScanStore.
pub struct PostgresDataStore {
    pool: PgPool,
    query_timeout: Duration,
    health_check_timeout: Duration,
}

impl PostgresDataStore {
    /// Creates a new PostgreSQL data store from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            health_check_timeout: Duration::from_secs(DEFAULT_HEALTH_CHECK_TIMEOUT_SECS),
        }
    }

    /// Creates a new PostgreSQL data store with the given configuration.
    #[instrument(skip(config))]
    pub async fn from_config(config: &PostgresConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| StorageError::ConnectionError {
                message: e.to_string(),
            })?;

        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            health_check_timeout: Duration::from_secs(config.health_check_timeout_secs),
        })
    }

    /// Creates a new PostgreSQL data store from a database URL.
    pub async fn from_url(database_url: &str) -> StorageResult<Self> {
        let config = PostgresConfig {
            database_url: database_url.to_string(),
            ..Default::default()
        };
        Self::from_config(&config).await
    }

    /// Runs database migrations to create required tables.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> StorageResult<()> {
        debug!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scans (
                id BIGSERIAL PRIMARY KEY,
                barcode VARCHAR(255) NOT NULL,
                scanned_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                notes TEXT,
                CONSTRAINT uq_scan_barcode UNIQUE (barcode)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(query_error("Failed to create scans table"))?;

        // Listing and export both order by (scanned_at DESC, id DESC).
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scans_scanned_at ON scans(scanned_at DESC, id DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(query_error("Failed to create scans index"))?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Returns the connection pool for testing or advanced usage.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ScanStore for PostgresDataStore {
    #[instrument(skip(self, scan), fields(barcode = %scan.barcode))]
    async fn insert_scan(&self, scan: NewScan) -> StorageResult<StoredScan> {
        validate_new_scan(&scan)?;

        let row = execute_with_timeout(BACKEND, "insert_scan", self.query_timeout, async {
            sqlx::query(
                r#"
                INSERT INTO scans (barcode, notes)
                VALUES ($1, $2)
                RETURNING id, barcode, scanned_at, notes
                "#,
            )
            .bind(&scan.barcode)
            .bind(&scan.notes)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, &scan.barcode))
        })
        .await?;

        row_to_stored_scan(row)
    }

    #[instrument(skip(self))]
    async fn find_by_barcode(&self, barcode: &str) -> StorageResult<Option<StoredScan>> {
        let row = execute_with_timeout(BACKEND, "find_by_barcode", self.query_timeout, async {
            sqlx::query("SELECT id, barcode, scanned_at, notes FROM scans WHERE barcode = $1")
                .bind(barcode)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error("Failed to find scan by barcode"))
        })
        .await?;

        row.map(row_to_stored_scan).transpose()
    }

    #[instrument(skip(self))]
    async fn get_scan(&self, id: i64) -> StorageResult<StoredScan> {
        let row = execute_with_timeout(BACKEND, "get_scan", self.query_timeout, async {
            sqlx::query("SELECT id, barcode, scanned_at, notes FROM scans WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error("Failed to get scan"))
        })
        .await?;

        match row {
            Some(row) => row_to_stored_scan(row),
            None => Err(StorageError::ScanNotFound { id }),
        }
    }

    #[instrument(skip(self, filter))]
    async fn count_scans(&self, filter: &ScanFilter) -> StorageResult<u64> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM scans");
        apply_scan_filters(&mut builder, filter);

        let count: i64 = execute_with_timeout(BACKEND, "count_scans", self.query_timeout, async {
            builder
                .build_query_scalar::<i64>()
                .fetch_one(&self.pool)
                .await
                .map_err(query_error("Failed to count scans"))
        })
        .await?;

        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self, filter))]
    async fn list_scans(
        &self,
        filter: &ScanFilter,
        page: Option<Page>,
    ) -> StorageResult<Vec<StoredScan>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {SCAN_COLUMNS} FROM scans"));
        apply_scan_filters(&mut builder, filter);
        builder.push(" ORDER BY scanned_at DESC, id DESC");
        if let Some(page) = page {
            builder.push(" LIMIT ");
            builder.push_bind(to_sql_i64(page.limit, "limit")?);
            builder.push(" OFFSET ");
            builder.push_bind(to_sql_i64(page.offset, "offset")?);
        }

        let rows = execute_with_timeout(BACKEND, "list_scans", self.query_timeout, async {
            builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(query_error("Failed to list scans"))
        })
        .await?;

        rows.into_iter().map(row_to_stored_scan).collect()
    }

    #[instrument(skip(self))]
    async fn clear_scans(&self) -> StorageResult<u64> {
        // A single DELETE is atomic: on failure nothing is removed.
        let result = execute_with_timeout(BACKEND, "clear_scans", self.query_timeout, async {
            sqlx::query("DELETE FROM scans")
                .execute(&self.pool)
                .await
                .map_err(query_error("Failed to clear scans"))
        })
        .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let start = Instant::now();

        let check_result = tokio::time::timeout(self.health_check_timeout, async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::HealthCheckFailed {
                    message: format!("database ping failed: {e}"),
                })
        })
        .await;

        let latency = start.elapsed();
        let status = match &check_result {
            Ok(Ok(_)) => "success",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        record_health_check(BACKEND, status, latency);

        match check_result {
            Ok(result) => {
                result?;
            }
            Err(_elapsed) => {
                return Err(StorageError::QueryTimeout {
                    operation: "health_check".to_string(),
                    timeout: self.health_check_timeout,
                });
            }
        }

        Ok(HealthStatus {
            healthy: true,
            latency,
            pool_stats: Some(pool_stats(&self.pool, BACKEND)),
            message: Some("postgresql".to_string()),
        })
    }
}

impl std::fmt::Debug for PostgresDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDataStore")
            .field("pool", &"PgPool")
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}
