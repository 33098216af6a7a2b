//! Data types for scan record operations.

use barscan_storage::{StorageError, StoredScan};

use crate::export::ExportError;
use crate::handlers::filter::FilterError;

/// Message returned when a new record is stored.
pub const SCAN_RECORDED_MESSAGE: &str = "Scan recorded successfully";

/// Message returned when a conflicting insert cannot be resolved.
pub const CREATION_FAILED_MESSAGE: &str = "Failed to create scan record";

/// Timestamp layout used in duplicate messages.
pub const DUPLICATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Request to record a scanned barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateScanRequest {
    /// Raw barcode as submitted; surrounding whitespace is ignored.
    pub barcode: String,
    /// Optional notes; blank notes are stored as absent.
    pub notes: Option<String>,
}

impl CreateScanRequest {
    /// Creates a new scan request.
    pub fn new(barcode: impl Into<String>, notes: Option<String>) -> Self {
        Self {
            barcode: barcode.into(),
            notes,
        }
    }
}

/// Result of a create request.
///
/// A duplicate is not an error: `scan` is then the record that already
/// existed, unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCreateOutcome {
    pub scan: StoredScan,
    pub is_duplicate: bool,
    pub message: String,
}

impl ScanCreateOutcome {
    pub(crate) fn created(scan: StoredScan) -> Self {
        Self {
            scan,
            is_duplicate: false,
            message: SCAN_RECORDED_MESSAGE.to_string(),
        }
    }

    pub(crate) fn duplicate(scan: StoredScan) -> Self {
        let message = format!(
            "Barcode {} already exists, scanned at: {}",
            scan.barcode,
            scan.scanned_at.format(DUPLICATE_TIME_FORMAT)
        );
        Self {
            scan,
            is_duplicate: true,
            message,
        }
    }
}

/// One page of a filtered listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage {
    pub scans: Vec<StoredScan>,
    /// Number of matching records, regardless of paging.
    pub total: u64,
}

/// Rendered spreadsheet export.
#[derive(Debug, Clone)]
pub struct ScanExport {
    /// Attachment file name.
    pub filename: String,
    /// Workbook bytes.
    pub content: Vec<u8>,
    /// Number of records exported.
    pub records: usize,
}

/// Result of a bulk clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearOutcome {
    pub deleted: u64,
    pub message: String,
}

impl ClearOutcome {
    pub(crate) fn new(deleted: u64) -> Self {
        Self {
            deleted,
            message: format!("Cleared {deleted} records"),
        }
    }
}

/// Errors that can occur during scan operations.
#[derive(Debug, thiserror::Error)]
pub enum ScanServiceError {
    /// Request input failed validation.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Query parameters could not be parsed.
    #[error(transparent)]
    InvalidQuery(#[from] FilterError),

    /// No record with this id.
    #[error("scan not found: {id}")]
    NotFound { id: i64 },

    /// Insert hit the uniqueness constraint but the conflicting record
    /// could not be read back.
    #[error("failed to create scan record for barcode {barcode}")]
    CreationFailed { barcode: String },

    /// Spreadsheet rendering failed.
    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    /// Storage backend failure.
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ScanServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidInput { message } => ScanServiceError::InvalidInput { message },
            StorageError::ScanNotFound { id } => ScanServiceError::NotFound { id },
            other => ScanServiceError::Storage(other),
        }
    }
}

/// Result type for scan operations.
pub type ScanServiceResult<T> = Result<T, ScanServiceError>;
