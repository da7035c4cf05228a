//! 에러 타입 — 도메인별 에러 정의

use crate::types::ScanStatus;

/// Docklens 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum DocklensError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스캔 레코드 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 컨테이너 런타임(이미지 조회) 에러
    #[error("image error: {0}")]
    Image(#[from] ImageError),

    /// 스캔 실행/상태 전이 에러
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 스캔 레코드 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 저장소 초기화/연결 실패
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// 동일 scan_id 레코드가 이미 존재
    #[error("record already exists: {0}")]
    Duplicate(String),

    /// 레코드 없음
    #[error("record not found: {0}")]
    NotFound(String),

    /// 직렬화/역직렬화 실패
    #[error("record encoding failed for '{scan_id}': {reason}")]
    Encoding { scan_id: String, reason: String },

    /// 파일 I/O 실패
    #[error("record io failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 허용되지 않는 상태 전이
    #[error(transparent)]
    Transition(#[from] ScanError),
}

/// 컨테이너 런타임(이미지) 에러
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// 허용되지 않는 이미지 참조 형식
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    /// 이미지가 로컬에 없음
    #[error("image not found: {0}")]
    NotFound(String),

    /// Docker 데몬에 연결할 수 없음
    #[error("container runtime unreachable: {0}")]
    Unreachable(String),

    /// 기타 API 에러
    #[error("container runtime api error: {0}")]
    Api(String),
}

/// 스캔 도메인 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// 상태 머신이 허용하지 않는 전이
    #[error("invalid transition for scan '{scan_id}': {from} -> {to}")]
    InvalidTransition {
        scan_id: String,
        from: ScanStatus,
        to: ScanStatus,
    },

    /// 외부 스캐너 실행 실패
    #[error("scan execution failed: {0}")]
    Execution(String),

    /// 스캐너 출력 해석 실패
    #[error("scan output parse failed: {0}")]
    Parse(String),
}
