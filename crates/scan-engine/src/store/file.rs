//! 파일 기반 레코드 저장소
//!
//! 레코드 하나를 `<records_dir>/<encoded scan_id>.json` 파일 하나로 저장합니다.
//! 쓰기는 임시 파일에 기록한 뒤 rename 하므로 중간 상태의 파일이 남지 않습니다.
//!
//! # 보안 제한
//!
//! - 레코드 파일당 최대 16MB (`MAX_RECORD_FILE_SIZE`)
//! - 파일명은 `[A-Za-z0-9._-]` 외 문자를 `%XX`로 인코딩 (경로 구분자 차단)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use docklens_core::error::StorageError;
use docklens_core::types::{ScanRecord, ScanStatus, ScanUpdate};

use super::{ScanFilter, ScanRecordStore, sort_newest_first};

/// 레코드 파일 최대 크기 (16MB)
const MAX_RECORD_FILE_SIZE: u64 = 16 * 1024 * 1024;

const RECORD_EXTENSION: &str = "json";

/// 레코드당 JSON 파일 1개를 사용하는 저장소
///
/// 열 때 디렉토리의 모든 레코드를 메모리 인덱스로 읽어오며, 조회는 인덱스에서,
/// 갱신은 인덱스와 파일에 함께 반영합니다. 원본 리포트는 파일에만 두고 인덱스에는
/// 보관하지 않으며, 완료된 레코드를 `get`으로 조회할 때 파일에서 읽습니다.
#[derive(Debug)]
pub struct FileRecordStore {
    dir: PathBuf,
    index: RwLock<HashMap<String, ScanRecord>>,
}

impl FileRecordStore {
    /// 디렉토리를 열고 기존 레코드를 로드합니다.
    ///
    /// 디렉토리가 없으면 생성합니다. 읽을 수 없거나 손상된 파일은 경고 후 건너뜁니다.
    ///
    /// # Note
    ///
    /// 동기 I/O를 수행합니다. 데몬 시작 시 한 번만 호출합니다.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        let mut index = HashMap::new();
        let entries = std::fs::read_dir(&dir).map_err(|e| io_error(&dir, e))?;

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "failed to read directory entry");
                    continue;
                }
            };
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            match load_record(&path) {
                Ok(record) => {
                    index.insert(record.scan_id.clone(), record.without_report());
                }
                Err(reason) => {
                    tracing::warn!(path = %path.display(), reason = %reason, "skipping unreadable scan record");
                }
            }
        }

        tracing::info!(dir = %dir.display(), records = index.len(), "opened scan record store");

        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    /// 저장 디렉토리
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 로드된 레코드 수
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    fn record_path(&self, scan_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{RECORD_EXTENSION}", encode_file_stem(scan_id)))
    }

    async fn persist(&self, record: &ScanRecord) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| StorageError::Encoding {
            scan_id: record.scan_id.clone(),
            reason: e.to_string(),
        })?;

        let path = self.record_path(&record.scan_id);
        let tmp = path.with_extension(format!("{RECORD_EXTENSION}.tmp"));

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(&path, e));
        }
        Ok(())
    }
}

impl ScanRecordStore for FileRecordStore {
    async fn create(&self, record: ScanRecord) -> Result<(), StorageError> {
        let mut index = self.index.write().await;
        if index.contains_key(&record.scan_id) {
            return Err(StorageError::Duplicate(record.scan_id));
        }
        self.persist(&record).await?;
        index.insert(record.scan_id.clone(), record.without_report());
        Ok(())
    }

    async fn get(&self, scan_id: &str) -> Result<Option<ScanRecord>, StorageError> {
        let Some(indexed) = self.index.read().await.get(scan_id).cloned() else {
            return Ok(None);
        };
        if indexed.status != ScanStatus::Completed {
            return Ok(Some(indexed));
        }

        let path = self.record_path(scan_id);
        let loaded = tokio::task::spawn_blocking(move || load_record(&path)).await;
        match loaded {
            Ok(Ok(record)) if record.scan_id == scan_id => Ok(Some(record)),
            Ok(Ok(_)) => Ok(Some(indexed)),
            Ok(Err(reason)) => {
                tracing::warn!(scan_id, reason = %reason, "failed to load scan report, returning index entry");
                Ok(Some(indexed))
            }
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }

    async fn update(
        &self,
        scan_id: &str,
        update: ScanUpdate,
        now: DateTime<Utc>,
    ) -> Result<ScanRecord, StorageError> {
        let mut index = self.index.write().await;
        let current = index
            .get(scan_id)
            .ok_or_else(|| StorageError::NotFound(scan_id.to_owned()))?;

        // 파일 쓰기가 성공한 경우에만 인덱스를 교체
        let mut next = current.clone();
        next.apply(update, now)?;
        self.persist(&next).await?;
        index.insert(scan_id.to_owned(), next.without_report());
        Ok(next)
    }

    async fn find(&self, filter: &ScanFilter) -> Result<Vec<ScanRecord>, StorageError> {
        let mut found: Vec<ScanRecord> = self
            .index
            .read()
            .await
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        sort_newest_first(&mut found);
        Ok(found)
    }
}

fn load_record(path: &Path) -> Result<ScanRecord, String> {
    let metadata = std::fs::metadata(path).map_err(|e| e.to_string())?;
    if metadata.len() > MAX_RECORD_FILE_SIZE {
        return Err(format!(
            "file size {} bytes exceeds maximum {} bytes",
            metadata.len(),
            MAX_RECORD_FILE_SIZE
        ));
    }
    let content = std::fs::read(path).map_err(|e| e.to_string())?;
    serde_json::from_slice(&content).map_err(|e| e.to_string())
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// scan_id를 파일명으로 안전하게 인코딩합니다.
fn encode_file_stem(scan_id: &str) -> String {
    let mut out = String::with_capacity(scan_id.len());
    for byte in scan_id.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => out.push(byte as char),
            // 선두 '.'은 숨김 파일이 되므로 인코딩
            b'.' if !out.is_empty() => out.push('.'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
