//! 동시 실행 스캔 수 제한
//!
//! [`AdmissionController`]는 프로세스 전체에서 하나만 존재하며, 슬롯 확보에 성공하면
//! [`AdmissionPermit`]을 돌려줍니다. 슬롯 반환은 permit drop 시 정확히 한 번 일어나므로
//! 성공/실패/패닉 어떤 경로로 스캔이 끝나도 카운터가 새지 않습니다.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

use docklens_core::metrics as m;

use crate::error::ScanEngineError;

/// 동시 실행 슬롯 관리자
#[derive(Debug, Clone)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl AdmissionController {
    /// `max`개의 슬롯을 가진 컨트롤러를 생성합니다.
    pub fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// 슬롯을 즉시 확보하거나 `CapacityExceeded`를 반환합니다 (대기하지 않음).
    pub fn try_admit(&self) -> Result<AdmissionPermit, ScanEngineError> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => {
                metrics::gauge!(m::SCANS_IN_FLIGHT).increment(1.0);
                debug!(in_flight = self.in_flight(), max = self.max, "admission granted");
                Ok(AdmissionPermit { _permit: permit })
            }
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => {
                Err(ScanEngineError::CapacityExceeded { limit: self.max })
            }
        }
    }

    /// 현재 실행 중인 스캔 수
    pub fn in_flight(&self) -> usize {
        self.max.saturating_sub(self.semaphore.available_permits())
    }

    /// 남은 슬롯 수
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 최대 슬롯 수
    pub fn max(&self) -> usize {
        self.max
    }
}

/// 확보된 실행 슬롯
///
/// drop 시 슬롯이 반환됩니다. 명시적으로 반환하려면 [`release`](Self::release)를 호출합니다.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    /// 슬롯을 반환합니다.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        metrics::gauge!(m::SCANS_IN_FLIGHT).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_max() {
        let controller = AdmissionController::new(3);
        let p1 = controller.try_admit().unwrap();
        let p2 = controller.try_admit().unwrap();
        let p3 = controller.try_admit().unwrap();
        assert_eq!(controller.in_flight(), 3);

        let err = controller.try_admit().unwrap_err();
        assert!(matches!(err, ScanEngineError::CapacityExceeded { limit: 3 }));
        assert_eq!(controller.in_flight(), 3);

        drop((p1, p2, p3));
        assert_eq!(controller.in_flight(), 0);
    }

    #[test]
    fn release_frees_exactly_one_slot() {
        let controller = AdmissionController::new(2);
        let p1 = controller.try_admit().unwrap();
        let _p2 = controller.try_admit().unwrap();
        assert_eq!(controller.available(), 0);

        p1.release();
        assert_eq!(controller.available(), 1);
        assert_eq!(controller.in_flight(), 1);
    }

    #[test]
    fn clones_share_the_same_counter() {
        let controller = AdmissionController::new(1);
        let other = controller.clone();
        let _p = controller.try_admit().unwrap();
        assert!(other.try_admit().is_err());
        assert_eq!(other.in_flight(), 1);
    }

    #[tokio::test]
    async fn permit_released_when_task_panics() {
        let controller = AdmissionController::new(1);
        let permit = controller.try_admit().unwrap();

        let handle = tokio::spawn(async move {
            let _permit = permit;
            panic!("scan task blew up");
        });
        assert!(handle.await.unwrap_err().is_panic());

        assert_eq!(controller.in_flight(), 0);
        assert!(controller.try_admit().is_ok());
    }

    #[tokio::test]
    async fn concurrent_admissions_never_exceed_max() {
        let controller = AdmissionController::new(4);
        let mut handles = Vec::new();
        for _ in 0..32 {
            let c = controller.clone();
            handles.push(tokio::spawn(async move { c.try_admit().ok() }));
        }

        let mut permits = Vec::new();
        for h in handles {
            if let Some(p) = h.await.unwrap() {
                permits.push(p);
            }
        }
        assert_eq!(permits.len(), 4);
        drop(permits);
        assert_eq!(controller.available(), 4);
    }
}
