//! 진행 상황 조회용 임시 캐시
//!
//! durable 저장소가 기준이며, 이 캐시는 폴링 시 진행 문구(`progress`)를 빠르게 돌려주기 위한
//! 보조 저장소입니다. 항목은 스캔을 소유한 백그라운드 작업만 갱신하고, 종료 후
//! 보존 시간이 지나면 제거됩니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use docklens_core::metrics as m;
use docklens_core::types::{ScanRecord, ScanUpdate};

/// 스캔 ID → 레코드 사본
#[derive(Debug, Clone)]
pub struct ScanCache {
    entries: Arc<RwLock<HashMap<String, ScanRecord>>>,
    retention: Duration,
}

impl ScanCache {
    /// `retention` 동안 종료된 항목을 보존하는 캐시를 생성합니다.
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    /// 새 항목을 추가합니다. 원본 리포트는 보관하지 않습니다.
    pub async fn insert(&self, record: ScanRecord) {
        let mut entries = self.entries.write().await;
        entries.insert(record.scan_id.clone(), record.without_report());
        metrics::gauge!(m::CACHE_ENTRIES).set(entries.len() as f64);
    }

    /// 항목 사본을 반환합니다.
    pub async fn get(&self, scan_id: &str) -> Option<ScanRecord> {
        self.entries.read().await.get(scan_id).cloned()
    }

    /// 항목에 갱신을 적용합니다.
    ///
    /// 항목이 없거나 전이가 거부되면 경고만 남깁니다. 캐시는 보조 저장소이므로
    /// 실패가 스캔 흐름에 영향을 주지 않습니다.
    pub async fn apply(&self, scan_id: &str, update: ScanUpdate, now: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        let Some(record) = entries.get_mut(scan_id) else {
            debug!(scan_id, "cache entry missing, skipping update");
            return;
        };
        if let Err(e) = record.apply(update, now) {
            warn!(scan_id, error = %e, "cache update rejected");
            return;
        }
        record.raw_report = None;
    }

    /// 항목을 즉시 제거합니다.
    pub async fn remove(&self, scan_id: &str) -> Option<ScanRecord> {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(scan_id);
        metrics::gauge!(m::CACHE_ENTRIES).set(entries.len() as f64);
        removed
    }

    /// 보존 시간 후 항목을 제거하는 태스크를 예약합니다.
    pub fn schedule_eviction(&self, scan_id: &str) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        let scan_id = scan_id.to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(cache.retention).await;
            if cache.remove(&scan_id).await.is_some() {
                debug!(scan_id = %scan_id, "evicted scan from cache");
            }
        })
    }

    /// 현재 항목 수
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// 보존 시간
    pub fn retention(&self) -> Duration {
        self.retention
    }
}
