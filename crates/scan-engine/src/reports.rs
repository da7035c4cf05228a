//! 소유자별 스캔 이력/요약 리포트
//!
//! 모두 순수 함수이며, 입력 레코드는 호출자가 소유자로 필터링해서 넘깁니다.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docklens_core::types::{ScanRecord, ScanStatus, VulnerabilityCounts};

use crate::quota::month_start;

/// 페이지 기본 크기
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// 페이지 최대 크기
pub const MAX_PAGE_LIMIT: u32 = 100;

/// 요약의 상위 이미지/최근 스캔 개수
pub const SUMMARY_TOP_N: usize = 5;

// --- 이력 ---

/// 이력 조회 요청 (쿼리 문자열)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    /// 정규화된 `(page, limit)`: page ≥ 1, limit ∈ 1..=100 (0/없음 → 10)
    pub fn normalize(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = match self.limit {
            None | Some(0) => DEFAULT_PAGE_LIMIT,
            Some(l) => l.min(MAX_PAGE_LIMIT),
        };
        (page, limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

/// 이력 페이지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub scans: Vec<ScanRecord>,
    pub pagination: Pagination,
}

/// 최신순으로 정렬된 레코드에서 한 페이지를 잘라냅니다. 원본 리포트는 제외됩니다.
pub fn paginate(records: &[ScanRecord], request: PageRequest) -> HistoryPage {
    let (page, limit) = request.normalize();
    let total = records.len() as u64;
    let pages = total.div_ceil(u64::from(limit));

    let skip = (page as usize - 1).saturating_mul(limit as usize);
    let scans = records
        .iter()
        .skip(skip)
        .take(limit as usize)
        .map(ScanRecord::without_report)
        .collect();

    HistoryPage {
        scans,
        pagination: Pagination {
            page,
            limit,
            total,
            pages,
        },
    }
}

// --- 요약 ---

/// 이미지별 누적 통계
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStats {
    pub image_id: String,
    pub total_vulnerabilities: u64,
    pub critical: u64,
    pub high: u64,
    pub last_scan: Option<DateTime<Utc>>,
}

/// 최근 스캔 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentScan {
    pub scan_id: String,
    pub image_ref: String,
    pub status: ScanStatus,
    pub start_time: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub vulnerability_counts: Option<VulnerabilityCounts>,
}

impl From<&ScanRecord> for RecentScan {
    fn from(r: &ScanRecord) -> Self {
        Self {
            scan_id: r.scan_id.clone(),
            image_ref: r.image_ref.clone(),
            status: r.status,
            start_time: r.start_time,
            completed_at: r.completed_at,
            vulnerability_counts: r.vulnerability_counts,
        }
    }
}

/// 소유자 요약
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub total_scans: u64,
    pub scans_this_month: u64,
    pub total_images: u64,
    pub vulnerability_counts: VulnerabilityCounts,
    pub most_vulnerable_images: Vec<ImageStats>,
    pub recent_scans: Vec<RecentScan>,
}

/// 소유자의 레코드로 요약을 계산합니다.
///
/// 집계 항목은 completed 레코드만 대상으로 하고, `recent_scans`는 상태와 무관하게
/// 최신 5건입니다. 상위 이미지는 취약점 합계 내림차순, 같으면 이미지 이름순입니다.
pub fn summarize(records: &[ScanRecord], now: DateTime<Utc>) -> ScanSummary {
    let since = month_start(now);
    let completed: Vec<&ScanRecord> = records
        .iter()
        .filter(|r| r.status == ScanStatus::Completed)
        .collect();

    let mut totals = VulnerabilityCounts::default();
    let mut per_image: BTreeMap<&str, ImageStats> = BTreeMap::new();

    for record in &completed {
        let counts = record.vulnerability_counts.unwrap_or_default();
        totals += counts;

        let stats = per_image
            .entry(record.image_ref.as_str())
            .or_insert_with(|| ImageStats {
                image_id: record.image_ref.clone(),
                total_vulnerabilities: 0,
                critical: 0,
                high: 0,
                last_scan: None,
            });
        stats.total_vulnerabilities += counts.total();
        stats.critical += counts.critical;
        stats.high += counts.high;
        stats.last_scan = stats.last_scan.max(record.completed_at);
    }

    let total_images = per_image.len() as u64;
    let mut most_vulnerable: Vec<ImageStats> = per_image.into_values().collect();
    // BTreeMap 순서(이미지 이름순) 위에 안정 정렬
    most_vulnerable.sort_by(|a, b| b.total_vulnerabilities.cmp(&a.total_vulnerabilities));
    most_vulnerable.truncate(SUMMARY_TOP_N);

    let mut recent: Vec<&ScanRecord> = records.iter().collect();
    recent.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    let recent_scans = recent
        .into_iter()
        .take(SUMMARY_TOP_N)
        .map(RecentScan::from)
        .collect();

    ScanSummary {
        total_scans: completed.len() as u64,
        scans_this_month: completed.iter().filter(|r| r.start_time >= since).count() as u64,
        total_images,
        vulnerability_counts: totals,
        most_vulnerable_images: most_vulnerable,
        recent_scans,
    }
}
