//! 스캔 엔진 에러 타입
//!
//! [`ScanEngineError`]는 제출 경로와 백그라운드 스캔에서 발생하는 에러를,
//! [`ToolError`]는 외부 프로세스 1회 실행의 실패 원인을 표현합니다.
//!
//! # 에러 카테고리
//!
//! - **제출 거부** (호출자에게 동기 반환): `CapacityExceeded`, `ImageNotFound`,
//!   `ScanAlreadyInProgress`, `QuotaExceeded`, `InvalidImageRef`
//! - **스캔 실패** (레코드에만 기록): `ScanExecutionFailed`, `Parse`, `DbInitFailed`
//! - **인프라**: `Gateway`, `Storage`, `Config`, `Transition`, `Task`

use docklens_core::error::{ConfigError, DocklensError, ImageError, ScanError, StorageError};
use docklens_image_gateway::ImageGatewayError;

/// 외부 프로세스 1회 실행 실패
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// 프로세스 생성 실패
    #[error("failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// 0이 아닌 종료 코드
    #[error("exited with {}: {stderr}", exit_label(.code))]
    NonZeroExit {
        /// 종료 코드 (시그널 종료 시 `None`)
        code: Option<i32>,
        /// 표준 에러 출력 (잘린 값)
        stderr: String,
    },

    /// 제한 시간 초과로 강제 종료
    #[error("timed out after {secs}s")]
    TimedOut { secs: u64 },

    /// 캡처 한도 초과
    #[error("output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },

    /// 파이프 I/O 실패
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "signal".to_owned(),
    }
}

/// 스캔 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ScanEngineError {
    /// 동시 실행 슬롯 부족
    #[error("scan capacity exceeded ({limit} scans already running)")]
    CapacityExceeded { limit: usize },

    /// 로컬 런타임에 이미지 없음
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// 같은 이미지에 대한 스캔이 진행 중
    #[error("scan already in progress: {scan_id}")]
    ScanAlreadyInProgress { scan_id: String },

    /// 이미지 참조와 다이제스트 모두 실패
    #[error("scan failed for image reference ({primary}) and image id ({fallback})")]
    ScanExecutionFailed {
        primary: ToolError,
        fallback: ToolError,
    },

    /// 스캐너 출력 해석 실패
    #[error("failed to parse scan results: {0}")]
    Parse(String),

    /// 취약점 DB 초기화 실패
    #[error("vulnerability database initialization failed: {0}")]
    DbInitFailed(#[source] ToolError),

    /// 월간 스캔 한도 초과
    #[error("monthly scan limit reached for '{owner}' ({used}/{limit})")]
    QuotaExceeded { owner: String, used: u32, limit: u32 },

    /// 이미지 참조 형식 오류
    #[error("invalid image reference: {0}")]
    InvalidImageRef(String),

    /// 스캔 레코드 없음
    #[error("scan not found: {0}")]
    NotFound(String),

    /// 다른 소유자의 스캔 조회
    #[error("scan '{scan_id}' belongs to another owner")]
    Forbidden { scan_id: String },

    /// 컨테이너 런타임 에러 (이미지 없음 제외)
    #[error("container runtime error: {0}")]
    Gateway(ImageGatewayError),

    /// 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config { field: String, reason: String },

    /// 허용되지 않는 상태 전이
    #[error(transparent)]
    Transition(ScanError),

    /// 백그라운드 태스크 비정상 종료
    #[error("scan task aborted: {0}")]
    Task(String),
}

impl From<ImageGatewayError> for ScanEngineError {
    fn from(err: ImageGatewayError) -> Self {
        match err {
            ImageGatewayError::ImageNotFound(r) => Self::ImageNotFound(r),
            ImageGatewayError::InvalidReference(reason) => Self::InvalidImageRef(reason),
            other => Self::Gateway(other),
        }
    }
}

impl From<ScanEngineError> for DocklensError {
    fn from(err: ScanEngineError) -> Self {
        match err {
            ScanEngineError::ImageNotFound(r) => DocklensError::Image(ImageError::NotFound(r)),
            ScanEngineError::InvalidImageRef(r) => {
                DocklensError::Image(ImageError::InvalidReference(r))
            }
            ScanEngineError::Gateway(e) => e.into(),
            ScanEngineError::Storage(e) => DocklensError::Storage(e),
            ScanEngineError::Config { field, reason } => {
                DocklensError::Config(ConfigError::InvalidValue { field, reason })
            }
            ScanEngineError::Transition(e) => DocklensError::Scan(e),
            ScanEngineError::Parse(msg) => DocklensError::Scan(ScanError::Parse(msg)),
            other => DocklensError::Scan(ScanError::Execution(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_zero_exit_display_with_code() {
        let err = ToolError::NonZeroExit {
            code: Some(1),
            stderr: "unable to find the specified image".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("status 1"));
        assert!(msg.contains("unable to find"));
    }

    #[test]
    fn non_zero_exit_display_signal() {
        let err = ToolError::NonZeroExit {
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("signal"));
    }

    #[test]
    fn execution_failed_names_both_causes() {
        let err = ScanEngineError::ScanExecutionFailed {
            primary: ToolError::TimedOut { secs: 310 },
            fallback: ToolError::NonZeroExit {
                code: Some(2),
                stderr: "manifest unknown".to_owned(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("timed out after 310s"));
        assert!(msg.contains("manifest unknown"));
    }

    #[test]
    fn gateway_not_found_maps_to_image_not_found() {
        let err: ScanEngineError = ImageGatewayError::ImageNotFound("ghost".to_owned()).into();
        assert!(matches!(err, ScanEngineError::ImageNotFound(_)));
    }

    #[test]
    fn gateway_connection_stays_gateway() {
        let err: ScanEngineError = ImageGatewayError::DockerConnection("refused".to_owned()).into();
        assert!(matches!(err, ScanEngineError::Gateway(_)));
    }

    #[test]
    fn converts_to_docklens_error() {
        let err: DocklensError = ScanEngineError::CapacityExceeded { limit: 3 }.into();
        assert!(matches!(err, DocklensError::Scan(ScanError::Execution(_))));

        let err: DocklensError = ScanEngineError::ImageNotFound("x".to_owned()).into();
        assert!(matches!(err, DocklensError::Image(ImageError::NotFound(_))));
    }

    #[test]
    fn quota_exceeded_display() {
        let err = ScanEngineError::QuotaExceeded {
            owner: "user-7".to_owned(),
            used: 10,
            limit: 10,
        };
        assert!(err.to_string().contains("10/10"));
    }
}
