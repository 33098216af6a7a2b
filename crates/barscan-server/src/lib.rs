//! barscan-server: Record service and business logic
//!
//! This crate contains the business logic layer including:
//! - Scan service (create-or-detect-duplicate, get, list, export, clear)
//! - Query parsing into storage filters
//! - Spreadsheet export
//! - Configuration management
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               barscan-server                 │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  handlers/   - Request handlers             │
//! │    filter.rs  - Filter and page parsing     │
//! │    scans/     - Scan record service         │
//! │  export/     - XLSX rendering               │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod export;
pub mod handlers;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use handlers::{ScanQuery, ScanService, ScanServiceError};
