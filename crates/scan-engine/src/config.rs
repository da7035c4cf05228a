//! 스캔 엔진 설정
//!
//! [`ScanEngineConfig`]는 core의 `[scanner]`, `[storage]`, `[quota]` 섹션을 모아
//! 엔진이 실제로 사용하는 형태(경로 확장, `Duration`, 정책 enum)로 변환합니다.
//!
//! # 사용 예시
//!
//! ```
//! use docklens_scan_engine::ScanEngineConfigBuilder;
//!
//! let config = ScanEngineConfigBuilder::new()
//!     .max_parallel_scans(5)
//!     .timeout_secs(600)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.max_parallel_scans, 5);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use docklens_core::config::{DocklensConfig, expand_home};

use crate::error::ScanEngineError;

/// 스캐너 강제 종료까지 스캐너 자체 타임아웃에 더하는 여유 시간
pub const HARD_TIMEOUT_GRACE_SECS: u64 = 10;

/// 설정 상한값 상수
const MAX_TIMEOUT_SECS: u64 = 3600;
const MAX_PARALLEL_SCANS: usize = 64;
const MAX_DB_INIT_TIMEOUT_SECS: u64 = 600;
const MAX_OUTPUT_BYTES: usize = 256 * 1024 * 1024;

/// 재시작 시 진행 중 상태로 남은 레코드 처리 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// 그대로 두고 경고만 남김
    #[default]
    Keep,
    /// failed로 전이
    Fail,
}

impl OrphanPolicy {
    /// 대소문자를 구분하지 않고 파싱합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "keep" => Some(Self::Keep),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}

/// 스캔 엔진 설정
#[derive(Debug, Clone)]
pub struct ScanEngineConfig {
    /// 스캐너 실행 파일
    pub binary: String,
    /// 스캐너 DB 캐시 디렉토리 (확장 완료된 경로)
    pub cache_dir: PathBuf,
    /// 스캐너에 전달하는 타임아웃 (초)
    pub timeout_secs: u64,
    /// 동시 실행 스캔 최대 수
    pub max_parallel_scans: usize,
    /// DB 초기화 타임아웃 (초)
    pub db_init_timeout_secs: u64,
    /// 캡처할 출력 최대 크기 (바이트)
    pub max_output_bytes: usize,
    /// 종료된 스캔의 임시 캐시 보존 시간 (초)
    pub cache_retention_secs: u64,
    /// 소유자별 월간 제출 한도 (0이면 무제한)
    pub monthly_scan_limit: u32,
    /// 재시작 시 고아 레코드 처리 정책
    pub orphan_policy: OrphanPolicy,
}

impl Default for ScanEngineConfig {
    fn default() -> Self {
        Self {
            binary: "trivy".to_owned(),
            cache_dir: expand_home("~/.cache/trivy"),
            timeout_secs: 300,
            max_parallel_scans: 3,
            db_init_timeout_secs: 60,
            max_output_bytes: 10 * 1024 * 1024,
            cache_retention_secs: 3600,
            monthly_scan_limit: 0,
            orphan_policy: OrphanPolicy::Keep,
        }
    }
}

impl ScanEngineConfig {
    /// core 설정에서 엔진 설정을 생성합니다.
    ///
    /// 알 수 없는 `orphan_policy`는 core 검증에서 걸러지므로 여기서는 `Keep`으로 대체합니다.
    pub fn from_core(core: &DocklensConfig) -> Self {
        Self {
            binary: core.scanner.binary.clone(),
            cache_dir: core.scanner.resolved_cache_dir(),
            timeout_secs: core.scanner.timeout_secs,
            max_parallel_scans: core.scanner.max_parallel_scans,
            db_init_timeout_secs: core.scanner.db_init_timeout_secs,
            max_output_bytes: core.scanner.max_output_bytes,
            cache_retention_secs: core.scanner.cache_retention_secs,
            monthly_scan_limit: core.quota.monthly_scan_limit,
            orphan_policy: OrphanPolicy::from_str_loose(&core.storage.orphan_policy)
                .unwrap_or_default(),
        }
    }

    /// 스캐너 프로세스의 강제 종료 시한
    pub fn scan_hard_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs + HARD_TIMEOUT_GRACE_SECS)
    }

    /// DB 초기화 시한
    pub fn db_init_timeout(&self) -> Duration {
        Duration::from_secs(self.db_init_timeout_secs)
    }

    /// 임시 캐시 보존 시간
    pub fn cache_retention(&self) -> Duration {
        Duration::from_secs(self.cache_retention_secs)
    }

    /// 설정 값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ScanEngineError> {
        if self.binary.trim().is_empty() {
            return Err(config_err("binary", "must not be empty".to_owned()));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(config_err("cache_dir", "must not be empty".to_owned()));
        }

        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(config_err(
                "timeout_secs",
                format!("must be 1-{MAX_TIMEOUT_SECS}"),
            ));
        }

        if self.max_parallel_scans == 0 || self.max_parallel_scans > MAX_PARALLEL_SCANS {
            return Err(config_err(
                "max_parallel_scans",
                format!("must be 1-{MAX_PARALLEL_SCANS}"),
            ));
        }

        if self.db_init_timeout_secs == 0 || self.db_init_timeout_secs > MAX_DB_INIT_TIMEOUT_SECS {
            return Err(config_err(
                "db_init_timeout_secs",
                format!("must be 1-{MAX_DB_INIT_TIMEOUT_SECS}"),
            ));
        }

        if self.max_output_bytes == 0 || self.max_output_bytes > MAX_OUTPUT_BYTES {
            return Err(config_err(
                "max_output_bytes",
                format!("must be 1-{MAX_OUTPUT_BYTES}"),
            ));
        }

        if self.cache_retention_secs == 0 {
            return Err(config_err(
                "cache_retention_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }
}

fn config_err(field: &str, reason: String) -> ScanEngineError {
    ScanEngineError::Config {
        field: field.to_owned(),
        reason,
    }
}

/// [`ScanEngineConfig`] 빌더
///
/// 빌드 시 유효성 검증을 수행합니다.
#[derive(Default)]
pub struct ScanEngineConfigBuilder {
    config: ScanEngineConfig,
}

impl ScanEngineConfigBuilder {
    /// 기본값을 가진 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.config.binary = binary.into();
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn max_parallel_scans(mut self, max: usize) -> Self {
        self.config.max_parallel_scans = max;
        self
    }

    pub fn db_init_timeout_secs(mut self, secs: u64) -> Self {
        self.config.db_init_timeout_secs = secs;
        self
    }

    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.config.max_output_bytes = bytes;
        self
    }

    pub fn cache_retention_secs(mut self, secs: u64) -> Self {
        self.config.cache_retention_secs = secs;
        self
    }

    pub fn monthly_scan_limit(mut self, limit: u32) -> Self {
        self.config.monthly_scan_limit = limit;
        self
    }

    pub fn orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.config.orphan_policy = policy;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    ///
    /// # Errors
    ///
    /// 유효성 검증 실패 시 `ScanEngineError::Config` 반환
    pub fn build(self) -> Result<ScanEngineConfig, ScanEngineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
