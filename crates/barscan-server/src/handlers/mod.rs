//! Request handlers.
//!
//! - `filter` - Query-string parsing into filters and pages
//! - `scans` - Scan record service

pub mod filter;
pub mod scans;

pub use filter::{FilterError, ScanQuery};
pub use scans::{ScanService, ScanServiceError};
