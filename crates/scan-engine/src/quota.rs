//! 소유자별 월간 스캔 한도
//!
//! 사용량은 별도 카운터 없이 durable 저장소에서 계산합니다. 이번 UTC 달력월에
//! 시작된 소유자의 레코드 수가 곧 사용량이므로, 레코드 생성이 사용량 증가이며
//! 재시작 후에도 값이 유지됩니다.

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::error::ScanEngineError;

/// 월간 한도 정책 (`limit == 0`이면 무제한)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyQuota {
    limit: u32,
}

impl MonthlyQuota {
    pub fn new(limit: u32) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit == 0
    }

    /// 사용량이 한도에 도달했으면 `QuotaExceeded`를 반환합니다.
    pub fn check(&self, owner: &str, used: u32) -> Result<(), ScanEngineError> {
        if !self.is_unlimited() && used >= self.limit {
            return Err(ScanEngineError::QuotaExceeded {
                owner: owner.to_owned(),
                used,
                limit: self.limit,
            });
        }
        Ok(())
    }

    /// 사용자에게 보여줄 한도 안내 문구
    pub fn message(&self) -> String {
        format!("Free tier is limited to {} scans per month.", self.limit)
    }
}

/// `now`가 속한 UTC 달력월의 시작 시각
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}
