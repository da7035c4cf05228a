//! Daemon health reporting.
//!
//! The scan engine reports one [`HealthStatus`] that already folds in
//! container runtime reachability and admission headroom. This module adds
//! daemon-level context (uptime, slot usage) for the `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

use docklens_core::service::HealthStatus;
use docklens_scan_engine::ScanService;

/// Health report served by `GET /health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonHealth {
    /// Engine status, flattened into `status` / `reason`.
    #[serde(flatten)]
    pub status: HealthStatus,
    /// Seconds since the daemon started.
    pub uptime_secs: u64,
    /// Scans currently holding an admission slot.
    pub in_flight: usize,
    /// Admission cap.
    pub max_parallel_scans: usize,
    pub version: &'static str,
}

impl DaemonHealth {
    /// Collect a fresh report from the scan service.
    pub async fn collect(service: &dyn ScanService, started_at: Instant) -> Self {
        let status = service.health().await;
        Self {
            status,
            uptime_secs: started_at.elapsed().as_secs(),
            in_flight: service.in_flight(),
            max_parallel_scans: service.max_parallel_scans(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// False only when the engine cannot scan at all.
    pub fn is_serving(&self) -> bool {
        !self.status.is_unhealthy()
    }
}
