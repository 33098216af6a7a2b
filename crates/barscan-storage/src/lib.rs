//! barscan-storage: Storage abstraction layer
//!
//! This crate provides the storage abstraction for barcode scan records:
//! - ScanStore trait for storage operations
//! - In-memory implementation for testing
//! - SQLite implementation for single-node deployments
//! - PostgreSQL implementation for production
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               barscan-storage                │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - ScanStore trait definition   │
//! │  memory.rs   - In-memory implementation     │
//! │  sqlite.rs   - SQLite implementation        │
//! │  postgres.rs - PostgreSQL implementation    │
//! │  sql.rs      - Shared sqlx helpers          │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod postgres;
mod sql;
pub mod sqlite;
pub mod traits;

// Re-export commonly used types
pub use error::{HealthStatus, PoolStats, StorageError, StorageResult};
pub use memory::MemoryDataStore;
pub use postgres::{PostgresConfig, PostgresDataStore};
pub use sqlite::{SqliteConfig, SqliteDataStore};
pub use traits::{
    current_timestamp, NewScan, Page, ScanFilter, ScanStore, StoredScan, MAX_BARCODE_LENGTH,
    MAX_NOTES_SIZE,
};
