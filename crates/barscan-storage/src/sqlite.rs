//! SQLite storage implementation.
//!
//! Timestamps are stored as fixed-width UTC text (`YYYY-MM-DD HH:MM:SS.ffffff`)
//! so that lexical comparison in SQL agrees with chronological order.

use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, instrument};

use crate::error::{HealthStatus, StorageError, StorageResult};
use crate::sql::{
    decode_error, execute_with_timeout, map_insert_error, pool_stats, query_error,
    record_health_check,
};
use crate::traits::{
    contains_pattern, current_timestamp, to_sql_i64, validate_new_scan, NewScan, Page,
    ScanFilter, ScanStore, StoredScan,
};

const BACKEND: &str = "sqlite";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn decode_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_PARSE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| StorageError::SerializationError {
            message: format!("invalid stored timestamp '{raw}': {e}"),
        })
}

fn row_to_stored_scan(row: SqliteRow) -> StorageResult<StoredScan> {
    let scanned_at: String = row.try_get("scanned_at").map_err(decode_error)?;
    Ok(StoredScan {
        id: row.try_get("id").map_err(decode_error)?,
        barcode: row.try_get("barcode").map_err(decode_error)?,
        scanned_at: decode_timestamp(&scanned_at)?,
        notes: row.try_get("notes").map_err(decode_error)?,
    })
}

/// Append the filter as a WHERE clause.
///
/// SQLite's `LIKE` is case-insensitive for ASCII, so barcode matching here
/// is looser than on the other backends.
fn apply_scan_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ScanFilter) {
    builder.push(" WHERE 1 = 1");

    if let Some(ref needle) = filter.barcode_contains {
        builder.push(" AND barcode LIKE ");
        builder.push_bind(contains_pattern(needle));
        builder.push(" ESCAPE '\\'");
    }

    if let Some(from) = filter.scanned_from {
        builder.push(" AND scanned_at >= ");
        builder.push_bind(encode_timestamp(from));
    }

    if let Some(until) = filter.scanned_until {
        builder.push(" AND scanned_at <= ");
        builder.push_bind(encode_timestamp(until));
    }
}

fn is_in_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// SQLite configuration options.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database URL, e.g. `sqlite://data/barcode_scanner.db?mode=rwc` or `sqlite::memory:`.
    pub database_url: String,
    /// Maximum number of connections in the pool. Forced to 1 for in-memory databases.
    pub max_connections: u32,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Maximum time a single query may run.
    pub query_timeout_secs: u64,
    /// Timeout for health checks in seconds.
    pub health_check_timeout_secs: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/barcode_scanner.db?mode=rwc".to_string(),
            max_connections: 10,
            connect_timeout_secs: 5,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            health_check_timeout_secs: DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
        }
    }
}

/// SQLite implementation of ScanStore.
pub struct SqliteDataStore {
    pool: SqlitePool,
    query_timeout: Duration,
    health_check_timeout: Duration,
}

impl SqliteDataStore {
    /// Creates a new SQLite data store from a connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            health_check_timeout: Duration::from_secs(DEFAULT_HEALTH_CHECK_TIMEOUT_SECS),
        }
    }

    /// Creates a new SQLite data store with the given configuration.
    ///
    /// The database file is created if missing. An in-memory database lives
    /// only as long as its connection, so the pool is pinned to a single
    /// connection that is never recycled.
    #[instrument(skip(config), fields(url = %config.database_url))]
    pub async fn from_config(config: &SqliteConfig) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| StorageError::ConnectionError {
                message: format!("invalid sqlite url: {e}"),
            })?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));
        pool_options = if is_in_memory_url(&config.database_url) {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(config.max_connections)
        };

        let pool = pool_options
            .connect_with(options)
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

    /// Creates a new SQLite data store from a database URL.
    pub async fn from_url(database_url: &str) -> StorageResult<Self> {
        let config = SqliteConfig {
            database_url: database_url.to_string(),
            ..Default::default()
        };
        Self::from_config(&config).await
    }

    /// Opens a fresh in-memory database with the schema applied.
    pub async fn in_memory() -> StorageResult<Self> {
        let store = Self::from_url("sqlite::memory:").await?;
        store.run_migrations().await?;
        Ok(store)
    }

    /// Runs database migrations to create required tables.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> StorageResult<()> {
        debug!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                barcode VARCHAR(255) NOT NULL,
                scanned_at TEXT NOT NULL,
                notes TEXT,
                CONSTRAINT uq_scan_barcode UNIQUE (barcode)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(query_error("Failed to create scans table"))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scans_scanned_at ON scans(scanned_at DESC, id DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(query_error("Failed to create scans index"))?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Inserts a scan with an explicit timestamp instead of the current time.
    pub async fn insert_scan_at(
        &self,
        scan: NewScan,
        scanned_at: DateTime<Utc>,
    ) -> StorageResult<StoredScan> {
        validate_new_scan(&scan)?;
        let encoded = encode_timestamp(scanned_at);

        let result = execute_with_timeout(BACKEND, "insert_scan", self.query_timeout, async {
            sqlx::query("INSERT INTO scans (barcode, scanned_at, notes) VALUES (?, ?, ?)")
                .bind(&scan.barcode)
                .bind(&encoded)
                .bind(&scan.notes)
                .execute(&self.pool)
                .await
                .map_err(|e| map_insert_error(e, &scan.barcode))
        })
        .await?;

        Ok(StoredScan {
            id: result.last_insert_rowid(),
            // Round-trip through the stored text so the returned value equals
            // what later reads produce.
            scanned_at: decode_timestamp(&encoded)?,
            barcode: scan.barcode,
            notes: scan.notes,
        })
    }

    /// Returns the connection pool for testing or advanced usage.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ScanStore for SqliteDataStore {
    #[instrument(skip(self, scan), fields(barcode = %scan.barcode))]
    async fn insert_scan(&self, scan: NewScan) -> StorageResult<StoredScan> {
        self.insert_scan_at(scan, current_timestamp()).await
    }

    #[instrument(skip(self))]
    async fn find_by_barcode(&self, barcode: &str) -> StorageResult<Option<StoredScan>> {
        let row = execute_with_timeout(BACKEND, "find_by_barcode", self.query_timeout, async {
            sqlx::query("SELECT id, barcode, scanned_at, notes FROM scans WHERE barcode = ?")
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
            sqlx::query("SELECT id, barcode, scanned_at, notes FROM scans WHERE id = ?")
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
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM scans");
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
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, barcode, scanned_at, notes FROM scans");
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
            message: Some("sqlite".to_string()),
        })
    }
}

impl std::fmt::Debug for SqliteDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDataStore")
            .field("pool", &"SqlitePool")
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}
