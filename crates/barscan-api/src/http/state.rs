//! Application state for HTTP handlers.

use std::sync::Arc;

use barscan_server::ScanService;
use barscan_storage::ScanStore;

/// State shared by every handler.
///
/// The router wraps it in an `Arc`, so cloning is never needed.
pub struct AppState<S: ScanStore> {
    /// The storage backend, used directly by the readiness probe.
    pub storage: Arc<S>,
    /// Record operations over the same backend.
    pub scans: ScanService<S>,
}

impl<S: ScanStore> AppState<S> {
    pub fn new(storage: Arc<S>) -> Self {
        let scans = ScanService::new(Arc::clone(&storage));
        Self { storage, scans }
    }
}
