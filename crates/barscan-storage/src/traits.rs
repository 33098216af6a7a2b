//! ScanStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use crate::error::{HealthStatus, StorageError, StorageResult};

/// Maximum barcode length in bytes (matches the `VARCHAR(255)` column).
pub const MAX_BARCODE_LENGTH: usize = 255;

/// Maximum notes size in bytes (64 KB).
pub const MAX_NOTES_SIZE: usize = 64 * 1024;

/// A scan record as persisted by storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredScan {
    /// Storage-assigned identifier.
    pub id: i64,
    /// Scanned barcode, unique across all records.
    pub barcode: String,
    /// Time the record was created.
    pub scanned_at: DateTime<Utc>,
    /// Optional free-text notes.
    pub notes: Option<String>,
}

/// A scan record to be inserted. `id` and `scanned_at` are assigned by storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScan {
    pub barcode: String,
    pub notes: Option<String>,
}

impl NewScan {
    pub fn new(barcode: impl Into<String>, notes: Option<String>) -> Self {
        Self {
            barcode: barcode.into(),
            notes,
        }
    }
}

/// Conjunctive filter over scan records.
///
/// `None` on any field means no constraint on that field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    /// Substring the barcode must contain.
    pub barcode_contains: Option<String>,
    /// Inclusive lower bound on `scanned_at`.
    pub scanned_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `scanned_at`.
    pub scanned_until: Option<DateTime<Utc>>,
}

impl ScanFilter {
    /// Returns true if the record satisfies every constraint of the filter.
    ///
    /// The barcode match is case-sensitive; SQL backends delegate to their
    /// own `LIKE` collation instead.
    pub fn matches(&self, scan: &StoredScan) -> bool {
        if let Some(ref needle) = self.barcode_contains {
            if !scan.barcode.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.scanned_from {
            if scan.scanned_at < from {
                return false;
            }
        }
        if let Some(until) = self.scanned_until {
            if scan.scanned_at > until {
                return false;
            }
        }
        true
    }
}

/// Offset/limit window over an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }
}

/// Abstract storage interface for scan records.
///
/// Implementations must be thread-safe (Send + Sync) and must enforce barcode
/// uniqueness atomically: of any number of concurrent inserts of the same
/// barcode exactly one succeeds, the rest fail with
/// [`StorageError::DuplicateBarcode`].
#[async_trait]
pub trait ScanStore: Send + Sync + 'static {
    /// Inserts a new scan, assigning its id and timestamp.
    async fn insert_scan(&self, scan: NewScan) -> StorageResult<StoredScan>;

    /// Finds a scan by exact barcode.
    async fn find_by_barcode(&self, barcode: &str) -> StorageResult<Option<StoredScan>>;

    /// Gets a scan by id.
    async fn get_scan(&self, id: i64) -> StorageResult<StoredScan>;

    /// Counts scans matching the filter.
    async fn count_scans(&self, filter: &ScanFilter) -> StorageResult<u64>;

    /// Lists scans matching the filter, newest first (`scanned_at DESC, id DESC`).
    ///
    /// `page = None` returns every match.
    async fn list_scans(
        &self,
        filter: &ScanFilter,
        page: Option<Page>,
    ) -> StorageResult<Vec<StoredScan>>;

    /// Deletes every scan, returning the number of records removed.
    async fn clear_scans(&self) -> StorageResult<u64>;

    /// Probes backend connectivity.
    async fn health_check(&self) -> StorageResult<HealthStatus>;
}

/// Validates a new scan before it reaches the backend.
pub fn validate_new_scan(scan: &NewScan) -> StorageResult<()> {
    if scan.barcode.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "barcode cannot be empty".to_string(),
        });
    }
    if scan.barcode.len() > MAX_BARCODE_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!(
                "barcode exceeds maximum length of {} bytes (actual: {} bytes)",
                MAX_BARCODE_LENGTH,
                scan.barcode.len()
            ),
        });
    }
    if let Some(ref notes) = scan.notes {
        if notes.len() > MAX_NOTES_SIZE {
            return Err(StorageError::InvalidInput {
                message: format!(
                    "notes exceed maximum size of {} bytes (actual: {} bytes)",
                    MAX_NOTES_SIZE,
                    notes.len()
                ),
            });
        }
    }
    Ok(())
}

/// Builds a `LIKE` pattern matching any value containing `needle`.
///
/// `%`, `_` and `\` in the needle are escaped; use with `ESCAPE '\'`.
pub fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Current UTC time truncated to microseconds, the precision every backend keeps.
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Converts an unsigned count or offset to the signed integer SQL expects.
pub(crate) fn to_sql_i64(value: u64, what: &str) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| StorageError::InvalidInput {
        message: format!("{what} out of range: {value}"),
    })
}
