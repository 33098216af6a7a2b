//! Scan record service implementation.

use std::sync::Arc;

use barscan_storage::{NewScan, ScanStore, StorageError, StoredScan};
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use super::types::{
    ClearOutcome, CreateScanRequest, ScanCreateOutcome, ScanExport, ScanPage, ScanServiceError,
    ScanServiceResult,
};
use crate::export::{export_filename, render_scans_xlsx};
use crate::handlers::filter::ScanQuery;

/// Record service over an injected storage handle.
///
/// Creation uses check-then-insert with a conflict fallback. The pre-check
/// answers the common duplicate case without a failing write; the storage
/// uniqueness constraint decides every race, and a rejected insert is
/// resolved by reading back the record that won.
pub struct ScanService<S: ScanStore> {
    store: Arc<S>,
}

impl<S: ScanStore> Clone for ScanService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ScanStore> ScanService<S> {
    /// Creates a new scan service.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the underlying storage handle.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Records a barcode, or reports the record that already holds it.
    #[instrument(skip(self, request), fields(barcode = %request.barcode.trim()))]
    pub async fn create_scan(
        &self,
        request: CreateScanRequest,
    ) -> ScanServiceResult<ScanCreateOutcome> {
        let barcode = request.barcode.trim();
        if barcode.is_empty() {
            return Err(ScanServiceError::InvalidInput {
                message: "barcode cannot be empty".to_string(),
            });
        }
        let notes = request.notes.filter(|n| !n.trim().is_empty());

        if let Some(existing) = self.store.find_by_barcode(barcode).await? {
            info!(id = existing.id, "duplicate barcode submitted");
            return Ok(duplicate(existing));
        }

        match self.store.insert_scan(NewScan::new(barcode, notes)).await {
            Ok(scan) => {
                debug!(id = scan.id, "scan recorded");
                metrics::counter!("barscan_scans_created_total", "outcome" => "created")
                    .increment(1);
                Ok(ScanCreateOutcome::created(scan))
            }
            Err(StorageError::DuplicateBarcode { .. }) => {
                warn!("concurrent insert won the race, reading back existing record");
                match self.store.find_by_barcode(barcode).await? {
                    Some(existing) => Ok(duplicate(existing)),
                    None => {
                        error!("insert rejected as duplicate but no record found");
                        Err(ScanServiceError::CreationFailed {
                            barcode: barcode.to_string(),
                        })
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Gets a single record by id.
    pub async fn get_scan(&self, id: i64) -> ScanServiceResult<StoredScan> {
        Ok(self.store.get_scan(id).await?)
    }

    /// Lists one page of matching records, newest first, with the total match count.
    #[instrument(skip(self))]
    pub async fn list_scans(&self, query: &ScanQuery) -> ScanServiceResult<ScanPage> {
        let filter = query.to_filter()?;
        let page = query.to_page()?;

        let total = self.store.count_scans(&filter).await?;
        let scans = self.store.list_scans(&filter, Some(page)).await?;

        Ok(ScanPage { scans, total })
    }

    /// Returns every matching record, newest first. Paging parameters are ignored.
    #[instrument(skip(self))]
    pub async fn export_scans(&self, query: &ScanQuery) -> ScanServiceResult<Vec<StoredScan>> {
        let filter = query.to_filter()?;
        Ok(self.store.list_scans(&filter, None).await?)
    }

    /// Renders the matching records as an `.xlsx` attachment.
    pub async fn export_workbook(&self, query: &ScanQuery) -> ScanServiceResult<ScanExport> {
        let scans = self.export_scans(query).await?;
        let content = render_scans_xlsx(&scans)?;

        info!(records = scans.len(), bytes = content.len(), "export rendered");
        Ok(ScanExport {
            filename: export_filename(Utc::now()),
            content,
            records: scans.len(),
        })
    }

    /// Deletes every record.
    #[instrument(skip(self))]
    pub async fn clear_scans(&self) -> ScanServiceResult<ClearOutcome> {
        let deleted = self.store.clear_scans().await?;
        warn!(deleted, "all scan records cleared");
        Ok(ClearOutcome::new(deleted))
    }
}

fn duplicate(existing: StoredScan) -> ScanCreateOutcome {
    metrics::counter!("barscan_scans_created_total", "outcome" => "duplicate").increment(1);
    ScanCreateOutcome::duplicate(existing)
}
