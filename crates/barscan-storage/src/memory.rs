//! In-memory storage implementation for testing.
//!
//! Records live in a `DashMap` keyed by barcode, so the uniqueness constraint
//! is enforced by the map's entry API rather than by any extra lock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::instrument;

use crate::error::{HealthStatus, StorageError, StorageResult};
use crate::traits::{
    current_timestamp, validate_new_scan, NewScan, Page, ScanFilter, ScanStore, StoredScan,
};

/// In-memory implementation of ScanStore.
///
/// # Performance Characteristics
///
/// - **Insert / find by barcode**: O(1) average (DashMap entry)
/// - **Get by id, count, list**: O(N) linear scan
/// - **Clear**: O(N)
#[derive(Debug)]
pub struct MemoryDataStore {
    scans: DashMap<String, StoredScan>,
    next_id: AtomicI64,
}

impl Default for MemoryDataStore {
    fn default() -> Self {
        Self {
            scans: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemoryDataStore {
    /// Creates a new in-memory data store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory data store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Inserts a scan with an explicit timestamp instead of the current time.
    ///
    /// Used to seed fixtures with a known scan history.
    pub fn insert_scan_at(
        &self,
        scan: NewScan,
        scanned_at: DateTime<Utc>,
    ) -> StorageResult<StoredScan> {
        validate_new_scan(&scan)?;

        match self.scans.entry(scan.barcode.clone()) {
            Entry::Occupied(_) => Err(StorageError::DuplicateBarcode {
                barcode: scan.barcode,
            }),
            Entry::Vacant(entry) => {
                let stored = StoredScan {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst),
                    barcode: scan.barcode,
                    scanned_at,
                    notes: scan.notes,
                };
                entry.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    /// Number of stored scans.
    pub fn len(&self) -> usize {
        self.scans.len()
    }

    /// Returns true if no scans are stored.
    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }
}

/// Sorts scans newest-first (scanned_at DESC, id DESC).
fn sort_newest_first(scans: &mut [StoredScan]) {
    scans.sort_by(|a, b| {
        b.scanned_at
            .cmp(&a.scanned_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[async_trait]
impl ScanStore for MemoryDataStore {
    #[instrument(skip(self, scan), fields(barcode = %scan.barcode))]
    async fn insert_scan(&self, scan: NewScan) -> StorageResult<StoredScan> {
        self.insert_scan_at(scan, current_timestamp())
    }

    async fn find_by_barcode(&self, barcode: &str) -> StorageResult<Option<StoredScan>> {
        Ok(self.scans.get(barcode).map(|s| s.value().clone()))
    }

    async fn get_scan(&self, id: i64) -> StorageResult<StoredScan> {
        self.scans
            .iter()
            .find(|entry| entry.value().id == id)
            .map(|entry| entry.value().clone())
            .ok_or(StorageError::ScanNotFound { id })
    }

    async fn count_scans(&self, filter: &ScanFilter) -> StorageResult<u64> {
        Ok(self
            .scans
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .count() as u64)
    }

    async fn list_scans(
        &self,
        filter: &ScanFilter,
        page: Option<Page>,
    ) -> StorageResult<Vec<StoredScan>> {
        let mut matching: Vec<StoredScan> = self
            .scans
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        sort_newest_first(&mut matching);

        Ok(match page {
            Some(page) => matching
                .into_iter()
                .skip(usize::try_from(page.offset).unwrap_or(usize::MAX))
                .take(usize::try_from(page.limit).unwrap_or(usize::MAX))
                .collect(),
            None => matching,
        })
    }

    #[instrument(skip(self))]
    async fn clear_scans(&self) -> StorageResult<u64> {
        // Count inside retain so the result is exactly what this call removed.
        let mut removed = 0u64;
        self.scans.retain(|_, _| {
            removed += 1;
            false
        });
        Ok(removed)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            latency: std::time::Duration::ZERO,
            pool_stats: None,
            message: Some("in-memory storage".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_memory_store_can_be_created() {
        let store = MemoryDataStore::new();
        assert!(store.is_empty());
        let scans = store
            .list_scans(&ScanFilter::default(), None)
            .await
            .unwrap();
        assert!(scans.is_empty());
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_timestamp() {
        let store = MemoryDataStore::new();
        let before = current_timestamp();

        let scan = store
            .insert_scan(NewScan::new("ABC123", Some("first".to_string())))
            .await
            .unwrap();

        assert_eq!(scan.id, 1);
        assert_eq!(scan.barcode, "ABC123");
        assert_eq!(scan.notes.as_deref(), Some("first"));
        assert!(scan.scanned_at >= before);
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let store = MemoryDataStore::new();
        let a = store.insert_scan(NewScan::new("A", None)).await.unwrap();
        let b = store.insert_scan(NewScan::new("B", None)).await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let store = MemoryDataStore::new();
        store.insert_scan(NewScan::new("DUP", None)).await.unwrap();

        let result = store.insert_scan(NewScan::new("DUP", None)).await;
        assert!(matches!(
            result,
            Err(StorageError::DuplicateBarcode { ref barcode }) if barcode == "DUP"
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_barcode_is_exact() {
        let store = MemoryDataStore::new();
        store.insert_scan(NewScan::new("ABC123", None)).await.unwrap();

        assert!(store.find_by_barcode("ABC123").await.unwrap().is_some());
        assert!(store.find_by_barcode("ABC").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_nonexistent_scan() {
        let store = MemoryDataStore::new();
        let result = store.get_scan(42).await;
        assert!(matches!(result, Err(StorageError::ScanNotFound { id: 42 })));
    }

    #[tokio::test]
    async fn test_list_orders_newest_first() {
        let store = MemoryDataStore::new();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap();
        store.insert_scan_at(NewScan::new("OLD", None), t1).unwrap();
        store.insert_scan_at(NewScan::new("NEW", None), t2).unwrap();
        // Same timestamp as NEW: the higher id sorts first.
        store.insert_scan_at(NewScan::new("TIE", None), t2).unwrap();

        let scans = store
            .list_scans(&ScanFilter::default(), None)
            .await
            .unwrap();
        let barcodes: Vec<_> = scans.iter().map(|s| s.barcode.as_str()).collect();
        assert_eq!(barcodes, vec!["TIE", "NEW", "OLD"]);
    }

    #[tokio::test]
    async fn test_list_paginates_and_count_ignores_page() {
        let store = MemoryDataStore::new();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..10 {
            store
                .insert_scan_at(
                    NewScan::new(format!("CODE{i:02}"), None),
                    base + chrono::Duration::minutes(i),
                )
                .unwrap();
        }

        let filter = ScanFilter::default();
        let page = store
            .list_scans(&filter, Some(Page::new(2, 3)))
            .await
            .unwrap();
        let barcodes: Vec<_> = page.iter().map(|s| s.barcode.as_str()).collect();
        assert_eq!(barcodes, vec!["CODE07", "CODE06", "CODE05"]);

        assert_eq!(store.count_scans(&filter).await.unwrap(), 10);

        let beyond = store
            .list_scans(&filter, Some(Page::new(50, 10)))
            .await
            .unwrap();
        assert!(beyond.is_empty());
    }

    #[tokio::test]
    async fn test_filter_by_barcode_and_dates() {
        let store = MemoryDataStore::new();
        let day1 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap();
        store.insert_scan_at(NewScan::new("PKG-001", None), day1).unwrap();
        store.insert_scan_at(NewScan::new("PKG-002", None), day2).unwrap();
        store.insert_scan_at(NewScan::new("BOX-001", None), day2).unwrap();

        let filter = ScanFilter {
            barcode_contains: Some("PKG".to_string()),
            scanned_from: Some(day2),
            scanned_until: None,
        };
        let scans = store.list_scans(&filter, None).await.unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].barcode, "PKG-002");
        assert_eq!(store.count_scans(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_returns_count_and_empties_store() {
        let store = MemoryDataStore::new();
        assert_eq!(store.clear_scans().await.unwrap(), 0);

        for i in 0..5 {
            store
                .insert_scan(NewScan::new(format!("C{i}"), None))
                .await
                .unwrap();
        }
        assert_eq!(store.clear_scans().await.unwrap(), 5);
        assert!(store.is_empty());

        // Barcodes become available again after a clear.
        store.insert_scan(NewScan::new("C0", None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_insert_same_barcode_single_winner() {
        let store = MemoryDataStore::new_shared();
        let num_tasks = 100;

        let handles: Vec<_> = (0..num_tasks)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.insert_scan(NewScan::new("RACE", None)).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(StorageError::DuplicateBarcode { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(successes, 1, "exactly one insert should win");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_health_check_always_returns_healthy() {
        let store = MemoryDataStore::new();
        let status = store.health_check().await.unwrap();

        assert!(status.healthy);
        assert!(status.pool_stats.is_none());
        assert_eq!(status.message, Some("in-memory storage".to_string()));
    }
}
