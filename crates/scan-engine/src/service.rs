//! dyn 호환 스캔 서비스 trait
//!
//! [`ScanOrchestrator`]는 제네릭이므로 HTTP 계층은 `Arc<dyn ScanService>`로
//! 구체 타입과 분리됩니다. 테스트에서는 이 trait의 mock으로 라우터를 검증합니다.

use docklens_core::service::{BoxFuture, HealthStatus};
use docklens_core::types::ScanRecord;
use docklens_image_gateway::ImageGateway;

use crate::error::ScanEngineError;
use crate::invoker::ProcessRunner;
use crate::orchestrator::ScanOrchestrator;
use crate::reports::{HistoryPage, PageRequest, ScanSummary};
use crate::store::ScanRecordStore;

/// HTTP 계층이 사용하는 스캔 서비스
pub trait ScanService: Send + Sync {
    /// 스캔을 제출하고 scan_id를 반환합니다.
    fn submit<'a>(
        &'a self,
        image_ref: &'a str,
        owner_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ScanEngineError>>;

    /// 스캔 상태를 조회합니다.
    fn status<'a>(
        &'a self,
        scan_id: &'a str,
        caller: Option<&'a str>,
    ) -> BoxFuture<'a, Result<ScanRecord, ScanEngineError>>;

    fn history<'a>(
        &'a self,
        owner_id: &'a str,
        request: PageRequest,
    ) -> BoxFuture<'a, Result<HistoryPage, ScanEngineError>>;

    fn summary<'a>(&'a self, owner_id: &'a str)
    -> BoxFuture<'a, Result<ScanSummary, ScanEngineError>>;

    fn health(&self) -> BoxFuture<'_, HealthStatus>;

    /// 현재 실행 중인 스캔 수
    fn in_flight(&self) -> usize;

    /// 최대 동시 실행 수
    fn max_parallel_scans(&self) -> usize;
}

impl<G, R, S> ScanService for ScanOrchestrator<G, R, S>
where
    G: ImageGateway,
    R: ProcessRunner,
    S: ScanRecordStore,
{
    fn submit<'a>(
        &'a self,
        image_ref: &'a str,
        owner_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ScanEngineError>> {
        Box::pin(ScanOrchestrator::submit(self, image_ref, owner_id))
    }

    fn status<'a>(
        &'a self,
        scan_id: &'a str,
        caller: Option<&'a str>,
    ) -> BoxFuture<'a, Result<ScanRecord, ScanEngineError>> {
        Box::pin(ScanOrchestrator::status(self, scan_id, caller))
    }

    fn history<'a>(
        &'a self,
        owner_id: &'a str,
        request: PageRequest,
    ) -> BoxFuture<'a, Result<HistoryPage, ScanEngineError>> {
        Box::pin(ScanOrchestrator::history(self, owner_id, request))
    }

    fn summary<'a>(
        &'a self,
        owner_id: &'a str,
    ) -> BoxFuture<'a, Result<ScanSummary, ScanEngineError>> {
        Box::pin(ScanOrchestrator::summary(self, owner_id))
    }

    fn health(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(ScanOrchestrator::health(self))
    }

    fn in_flight(&self) -> usize {
        ScanOrchestrator::in_flight(self)
    }

    fn max_parallel_scans(&self) -> usize {
        ScanOrchestrator::max_parallel_scans(self)
    }
}
