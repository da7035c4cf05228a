//! Shared state handed to every handler.

use std::sync::Arc;
use std::time::Instant;

use docklens_scan_engine::ScanService;

/// Application state for the HTTP API.
pub struct AppState {
    /// Scan engine behind its dyn-compatible facade.
    pub service: Arc<dyn ScanService>,
    /// Daemon start time for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<dyn ScanService>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }
}
