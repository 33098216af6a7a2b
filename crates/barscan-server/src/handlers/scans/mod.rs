//! Scan record operations.
//!
//! Create, read, list, export and clear over any [`ScanStore`] backend.
//!
//! [`ScanStore`]: barscan_storage::ScanStore

mod service;
mod types;

pub use service::ScanService;
pub use types::{
    ClearOutcome, CreateScanRequest, ScanCreateOutcome, ScanExport, ScanPage, ScanServiceError,
    ScanServiceResult, CREATION_FAILED_MESSAGE, DUPLICATE_TIME_FORMAT, SCAN_RECORDED_MESSAGE,
};
