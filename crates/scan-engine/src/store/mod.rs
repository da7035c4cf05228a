//! durable 스캔 레코드 저장소
//!
//! [`ScanRecordStore`]는 scan_id를 키로 하는 레코드 저장소를 추상화합니다.
//! 모든 상태 변경은 [`ScanRecord::apply`]를 거치므로 백엔드와 무관하게
//! 상태 머신 규칙(전진 전이만 허용, `completed_at` 1회 설정)이 유지됩니다.
//!
//! # 구현
//!
//! - [`MemoryRecordStore`]: 프로세스 수명 동안만 유지
//! - [`FileRecordStore`]: 레코드당 JSON 파일 1개, 재시작 후에도 유지

pub mod file;
pub mod memory;

use std::future::Future;

use chrono::{DateTime, Utc};

use docklens_core::error::StorageError;
use docklens_core::types::{ScanRecord, ScanStatus, ScanUpdate};

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;

/// 레코드 조회 조건
///
/// 모든 필드는 AND로 결합되며, `None`/빈 목록은 조건 없음을 뜻합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    pub image_ref: Option<String>,
    pub owner_id: Option<String>,
    pub statuses: Vec<ScanStatus>,
}

impl ScanFilter {
    /// 특정 이미지의 진행 중(pending/running) 레코드
    pub fn in_progress_for(image_ref: &str) -> Self {
        Self {
            image_ref: Some(image_ref.to_owned()),
            statuses: ScanStatus::IN_PROGRESS.to_vec(),
            ..Self::default()
        }
    }

    /// 모든 진행 중 레코드
    pub fn in_progress() -> Self {
        Self {
            statuses: ScanStatus::IN_PROGRESS.to_vec(),
            ..Self::default()
        }
    }

    /// 특정 소유자의 레코드
    pub fn owned_by(owner_id: &str) -> Self {
        Self {
            owner_id: Some(owner_id.to_owned()),
            ..Self::default()
        }
    }

    /// 상태 조건을 추가합니다.
    pub fn with_statuses(mut self, statuses: &[ScanStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn matches(&self, record: &ScanRecord) -> bool {
        self.image_ref
            .as_deref()
            .is_none_or(|r| r == record.image_ref)
            && self
                .owner_id
                .as_deref()
                .is_none_or(|o| record.owner_id.as_deref() == Some(o))
            && (self.statuses.is_empty() || self.statuses.contains(&record.status))
    }
}

/// durable 레코드 저장소
pub trait ScanRecordStore: Send + Sync + 'static {
    /// 새 레코드를 저장합니다. 같은 scan_id가 있으면 `StorageError::Duplicate`.
    fn create(&self, record: ScanRecord) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// scan_id로 레코드를 조회합니다.
    fn get(
        &self,
        scan_id: &str,
    ) -> impl Future<Output = Result<Option<ScanRecord>, StorageError>> + Send;

    /// 갱신을 적용하고 갱신된 레코드를 반환합니다.
    ///
    /// 레코드가 없으면 `StorageError::NotFound`, 전이가 거부되면 `StorageError::Transition`.
    fn update(
        &self,
        scan_id: &str,
        update: ScanUpdate,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<ScanRecord, StorageError>> + Send;

    /// 조건에 맞는 레코드를 최신 `start_time` 순으로 반환합니다.
    ///
    /// 목록 조회이므로 `raw_report`는 포함하지 않습니다. 원본 리포트는 `get`으로 조회합니다.
    fn find(
        &self,
        filter: &ScanFilter,
    ) -> impl Future<Output = Result<Vec<ScanRecord>, StorageError>> + Send;
}

/// 최신순 정렬 (같은 시각이면 scan_id 역순)
pub(crate) fn sort_newest_first(records: &mut [ScanRecord]) {
    records.sort_by(|a, b| {
        b.start_time
            .cmp(&a.start_time)
            .then_with(|| b.scan_id.cmp(&a.scan_id))
    });
}
