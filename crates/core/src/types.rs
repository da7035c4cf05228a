//! 도메인 타입 — 스캔 레코드와 상태 머신
//!
//! 모든 크레이트가 공유하는 스캔 데이터 구조를 정의합니다.
//! 상태 전이 규칙은 [`ScanRecord::apply`] 한 곳에서만 검증되며,
//! 임시 캐시와 영속 저장소 모두 이 메서드를 통해 레코드를 변경합니다.
//!
//! # 상태 전이
//!
//! ```text
//! pending ──> running ──> completed
//!    │           │
//!    └───────────┴──────> failed
//! ```

use std::fmt;
use std::ops::AddAssign;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// 취약점 심각도 버킷
///
/// 스캐너 출력의 심각도 라벨 중 집계 대상이 되는 네 가지만 표현합니다.
/// `UNKNOWN`, `NEGLIGIBLE` 등 그 외 라벨은 집계에서 제외됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적
    Critical,
}

impl Severity {
    /// 전체 버킷 목록 (낮은 순)
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// 스캐너 라벨을 버킷으로 변환합니다.
    ///
    /// 대소문자를 구분하지 않으며, 네 버킷 외의 라벨은 `None`입니다.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|severity| label.eq_ignore_ascii_case(severity.as_str()))
    }

    /// 소문자 라벨을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 심각도별 취약점 개수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityCounts {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl VulnerabilityCounts {
    /// 해당 버킷의 개수를 1 증가시킵니다.
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    /// 전체 취약점 수를 반환합니다.
    pub fn total(&self) -> u64 {
        self.critical + self.high + self.medium + self.low
    }
}

impl AddAssign for VulnerabilityCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.critical += rhs.critical;
        self.high += rhs.high;
        self.medium += rhs.medium;
        self.low += rhs.low;
    }
}

/// 스캔 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// 레코드 생성됨, 외부 도구 실행 전
    Pending,
    /// 백그라운드 작업 실행 중
    Running,
    /// 완료 (종료 상태)
    Completed,
    /// 실패 (종료 상태)
    Failed,
}

impl ScanStatus {
    /// 진행 중 상태 목록 (중복 스캔 검사에 사용)
    pub const IN_PROGRESS: [ScanStatus; 2] = [Self::Pending, Self::Running];

    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// `self`에서 `next`로의 전이가 허용되는지 확인합니다.
    ///
    /// 전이는 앞으로만 진행되며, 종료 상태에서는 어떤 전이도 허용되지 않습니다.
    /// 같은 진행 중 상태로의 전이(진행 문구 갱신)는 허용됩니다.
    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        match (self, next) {
            (Self::Pending, _) => true,
            (Self::Running, Self::Pending) => false,
            (Self::Running, _) => true,
            (Self::Completed | Self::Failed, _) => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 스캔 레코드 변경 요청
///
/// 백그라운드 작업만 생성하며, 레코드의 부분 갱신을 표현합니다.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanUpdate {
    /// running으로 전이하며 진행 문구 설정
    Running { progress: String },
    /// 진행 문구만 갱신 (상태 유지)
    Progress(String),
    /// 완료 처리
    Completed {
        counts: VulnerabilityCounts,
        warnings: Option<String>,
        raw_report: Option<serde_json::Value>,
    },
    /// 실패 처리
    Failed { error: String },
}

impl ScanUpdate {
    /// 이 갱신이 적용된 후의 상태 (`Progress`는 `None`)
    pub fn target_status(&self) -> Option<ScanStatus> {
        match self {
            Self::Running { .. } => Some(ScanStatus::Running),
            Self::Progress(_) => None,
            Self::Completed { .. } => Some(ScanStatus::Completed),
            Self::Failed { .. } => Some(ScanStatus::Failed),
        }
    }
}

/// 스캔 레코드
///
/// 스캔 시도 1회당 하나씩 존재합니다. `scan_id`와 `image_ref`는 생성 후 불변입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub scan_id: String,
    pub image_ref: String,
    pub status: ScanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerability_counts: Option<VulnerabilityCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_report: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl ScanRecord {
    /// pending 상태의 새 레코드를 생성합니다.
    pub fn pending(
        scan_id: impl Into<String>,
        image_ref: impl Into<String>,
        owner_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            scan_id: scan_id.into(),
            image_ref: image_ref.into(),
            status: ScanStatus::Pending,
            progress: None,
            start_time: now,
            completed_at: None,
            vulnerability_counts: None,
            warnings: None,
            error: None,
            raw_report: None,
            owner_id,
        }
    }

    /// 상태 전이를 검증한 뒤 갱신을 적용합니다.
    ///
    /// 종료 상태 진입 시에만 `completed_at`이 설정되며, 이후 어떤 갱신도 거부되므로
    /// `completed_at`은 정확히 한 번 설정됩니다.
    pub fn apply(&mut self, update: ScanUpdate, now: DateTime<Utc>) -> Result<(), ScanError> {
        let next = update.target_status().unwrap_or(self.status);
        if !self.status.can_transition_to(next) {
            return Err(ScanError::InvalidTransition {
                scan_id: self.scan_id.clone(),
                from: self.status,
                to: next,
            });
        }

        match update {
            ScanUpdate::Running { progress } => {
                self.status = ScanStatus::Running;
                self.progress = Some(progress);
            }
            ScanUpdate::Progress(progress) => {
                self.progress = Some(progress);
            }
            ScanUpdate::Completed {
                counts,
                warnings,
                raw_report,
            } => {
                self.status = ScanStatus::Completed;
                self.progress = None;
                self.vulnerability_counts = Some(counts);
                self.warnings = warnings;
                self.raw_report = raw_report;
                self.completed_at = Some(now);
            }
            ScanUpdate::Failed { error } => {
                self.status = ScanStatus::Failed;
                self.progress = None;
                self.vulnerability_counts = None;
                self.error = Some(error);
                self.completed_at = Some(now);
            }
        }
        Ok(())
    }

    /// 전체 취약점 수 (완료 전에는 0)
    pub fn total_vulnerabilities(&self) -> u64 {
        self.vulnerability_counts.map_or(0, |c| c.total())
    }

    /// 목록 조회용으로 원본 리포트를 제거한 사본을 반환합니다.
    pub fn without_report(&self) -> Self {
        Self {
            raw_report: None,
            ..self.clone()
        }
    }
}

/// 스캔 ID를 생성합니다: `{image_ref}_{epoch_millis}`
pub fn make_scan_id(image_ref: &str, now: DateTime<Utc>) -> String {
    format!("{image_ref}_{}", now.timestamp_millis())
}

/// 컨테이너 런타임이 반환한 이미지 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// 정규 다이제스트 (`sha256:...`)
    pub id: String,
    /// 태그 목록
    pub repo_tags: Vec<String>,
    /// 이미지 크기 (바이트)
    pub size_bytes: u64,
}

impl ImageInfo {
    /// 스캐너 폴백 대상: `sha256:` 접두어를 제거한 다이제스트
    pub fn fallback_ref(&self) -> &str {
        self.id.strip_prefix("sha256:").unwrap_or(&self.id)
    }
}

impl fmt::Display for ImageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digest = self.fallback_ref();
        write!(
            f,
            "{} tags=[{}]",
            &digest[..12.min(digest.len())],
            self.repo_tags.join(", ")
        )
    }
}
