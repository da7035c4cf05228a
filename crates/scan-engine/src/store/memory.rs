//! 메모리 기반 레코드 저장소

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use docklens_core::error::StorageError;
use docklens_core::types::{ScanRecord, ScanUpdate};

use super::{ScanFilter, ScanRecordStore, sort_newest_first};

/// 프로세스 수명 동안만 유지되는 저장소
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, ScanRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 레코드 수
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl ScanRecordStore for MemoryRecordStore {
    async fn create(&self, record: ScanRecord) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.scan_id) {
            return Err(StorageError::Duplicate(record.scan_id));
        }
        records.insert(record.scan_id.clone(), record);
        Ok(())
    }

    async fn get(&self, scan_id: &str) -> Result<Option<ScanRecord>, StorageError> {
        Ok(self.records.read().await.get(scan_id).cloned())
    }

    async fn update(
        &self,
        scan_id: &str,
        update: ScanUpdate,
        now: DateTime<Utc>,
    ) -> Result<ScanRecord, StorageError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(scan_id)
            .ok_or_else(|| StorageError::NotFound(scan_id.to_owned()))?;
        record.apply(update, now)?;
        Ok(record.clone())
    }

    async fn find(&self, filter: &ScanFilter) -> Result<Vec<ScanRecord>, StorageError> {
        let mut found: Vec<ScanRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| filter.matches(r))
            .map(ScanRecord::without_report)
            .collect();
        sort_newest_first(&mut found);
        Ok(found)
    }
}
