//! 설정 관리 — docklens.toml 파싱 및 런타임 설정
//!
//! [`DocklensConfig`]는 모든 크레이트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`DOCKLENS_SCANNER_TIMEOUT_SECS=600` 형식)
//! 3. 설정 파일 (`docklens.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), docklens_core::error::DocklensError> {
//! use docklens_core::config::DocklensConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = DocklensConfig::load("docklens.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = DocklensConfig::parse("[scanner]\nmax_parallel_scans = 5")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, DocklensError};

/// 설정 상한값 상수
const MAX_SCAN_TIMEOUT_SECS: u64 = 3600;
const MAX_PARALLEL_SCANS: usize = 64;
const MAX_DB_INIT_TIMEOUT_SECS: u64 = 600;
const MAX_OUTPUT_BYTES: usize = 256 * 1024 * 1024;

/// Docklens 통합 설정
///
/// `docklens.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocklensConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// HTTP 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// Docker 연결 설정
    #[serde(default)]
    pub docker: DockerConfig,
    /// 외부 스캐너 설정
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// 스캔 레코드 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 사용자별 스캔 한도
    #[serde(default)]
    pub quota: QuotaConfig,
    /// 메트릭 익스포터 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl DocklensConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DocklensError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 파일이 없으면 기본값에서 시작하는 [`load`](Self::load) 변형입니다.
    ///
    /// 기본 설정 경로를 사용할 때만 호출합니다. 명시적으로 지정된 경로가
    /// 없으면 `load`를 사용해 `FileNotFound`를 반환해야 합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, DocklensError> {
        let mut config = match Self::from_file(path.as_ref()).await {
            Ok(config) => config,
            Err(DocklensError::Config(ConfigError::FileNotFound { path })) => {
                warn!(path = %path, "config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DocklensError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DocklensError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DocklensError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, DocklensError> {
        toml::from_str(toml_str).map_err(|e| {
            DocklensError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `DOCKLENS_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "DOCKLENS_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "DOCKLENS_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "DOCKLENS_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "DOCKLENS_GENERAL_PID_FILE");

        // Server
        override_string(
            &mut self.server.listen_addr,
            "DOCKLENS_SERVER_LISTEN_ADDR",
        );
        override_u16(&mut self.server.port, "DOCKLENS_SERVER_PORT");
        override_usize(
            &mut self.server.body_limit_bytes,
            "DOCKLENS_SERVER_BODY_LIMIT_BYTES",
        );
        override_csv(
            &mut self.server.allowed_origins,
            "DOCKLENS_SERVER_ALLOWED_ORIGINS",
        );

        // Docker
        override_string(&mut self.docker.host, "DOCKLENS_DOCKER_HOST");
        override_string(
            &mut self.docker.socket_path,
            "DOCKLENS_DOCKER_SOCKET_PATH",
        );
        override_u64(
            &mut self.docker.timeout_secs,
            "DOCKLENS_DOCKER_TIMEOUT_SECS",
        );

        // Scanner
        override_string(&mut self.scanner.binary, "DOCKLENS_SCANNER_BINARY");
        override_string(&mut self.scanner.cache_dir, "DOCKLENS_SCANNER_CACHE_DIR");
        override_u64(
            &mut self.scanner.timeout_secs,
            "DOCKLENS_SCANNER_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.scanner.max_parallel_scans,
            "DOCKLENS_SCANNER_MAX_PARALLEL_SCANS",
        );
        override_u64(
            &mut self.scanner.db_init_timeout_secs,
            "DOCKLENS_SCANNER_DB_INIT_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.scanner.max_output_bytes,
            "DOCKLENS_SCANNER_MAX_OUTPUT_BYTES",
        );
        override_u64(
            &mut self.scanner.cache_retention_secs,
            "DOCKLENS_SCANNER_CACHE_RETENTION_SECS",
        );

        // Storage
        override_string(&mut self.storage.backend, "DOCKLENS_STORAGE_BACKEND");
        override_string(
            &mut self.storage.records_dir,
            "DOCKLENS_STORAGE_RECORDS_DIR",
        );
        override_string(
            &mut self.storage.orphan_policy,
            "DOCKLENS_STORAGE_ORPHAN_POLICY",
        );

        // Quota
        override_u32(
            &mut self.quota.monthly_scan_limit,
            "DOCKLENS_QUOTA_MONTHLY_SCAN_LIMIT",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "DOCKLENS_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "DOCKLENS_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "DOCKLENS_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DocklensError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.server.port == 0 {
            return Err(invalid("server.port", "must be 1-65535".to_owned()));
        }

        if !self.docker.host.is_empty() {
            let valid_schemes = ["tcp", "http", "unix"];
            let scheme = self.docker.host.split("://").next().unwrap_or_default();
            if !self.docker.host.contains("://") || !valid_schemes.contains(&scheme) {
                return Err(invalid(
                    "docker.host",
                    format!("scheme must be one of: {}", valid_schemes.join(", ")),
                ));
            }
        }

        if self.scanner.binary.trim().is_empty() {
            return Err(invalid(
                "scanner.binary",
                "must not be empty".to_owned(),
            ));
        }

        if self.scanner.timeout_secs == 0 || self.scanner.timeout_secs > MAX_SCAN_TIMEOUT_SECS {
            return Err(invalid(
                "scanner.timeout_secs",
                format!("must be 1-{MAX_SCAN_TIMEOUT_SECS}"),
            ));
        }

        if self.scanner.max_parallel_scans == 0
            || self.scanner.max_parallel_scans > MAX_PARALLEL_SCANS
        {
            return Err(invalid(
                "scanner.max_parallel_scans",
                format!("must be 1-{MAX_PARALLEL_SCANS}"),
            ));
        }

        if self.scanner.db_init_timeout_secs == 0
            || self.scanner.db_init_timeout_secs > MAX_DB_INIT_TIMEOUT_SECS
        {
            return Err(invalid(
                "scanner.db_init_timeout_secs",
                format!("must be 1-{MAX_DB_INIT_TIMEOUT_SECS}"),
            ));
        }

        if self.scanner.max_output_bytes == 0 || self.scanner.max_output_bytes > MAX_OUTPUT_BYTES {
            return Err(invalid(
                "scanner.max_output_bytes",
                format!("must be 1-{MAX_OUTPUT_BYTES}"),
            ));
        }

        if self.scanner.cache_retention_secs == 0 {
            return Err(invalid(
                "scanner.cache_retention_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        let valid_backends = ["memory", "file"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(invalid(
                "storage.backend",
                format!("must be one of: {}", valid_backends.join(", ")),
            ));
        }

        if self.storage.backend == "file" && self.storage.records_dir.is_empty() {
            return Err(invalid(
                "storage.records_dir",
                "must not be empty when backend is 'file'".to_owned(),
            ));
        }

        let valid_policies = ["keep", "fail"];
        if !valid_policies.contains(&self.storage.orphan_policy.as_str()) {
            return Err(invalid(
                "storage.orphan_policy",
                format!("must be one of: {}", valid_policies.join(", ")),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be 1-65535".to_owned()));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> DocklensError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
    /// PID 파일 경로 (빈 문자열이면 비활성)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/docklens".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// HTTP 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 요청 본문 최대 크기 (바이트)
    pub body_limit_bytes: usize,
    /// CORS 허용 origin 목록 (`*`이면 전체 허용)
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_owned(),
            port: 3000,
            body_limit_bytes: 64 * 1024,
            allowed_origins: vec!["http://localhost:3001".to_owned()],
        }
    }
}

/// Docker 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// 원격 호스트 (`tcp://host:2375`, `unix:///path`). 비어 있으면 `socket_path` 사용
    pub host: String,
    /// 로컬 Docker 소켓 경로
    pub socket_path: String,
    /// API 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            socket_path: "/var/run/docker.sock".to_owned(),
            timeout_secs: 120,
        }
    }
}

/// 외부 취약점 스캐너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// 스캐너 실행 파일
    pub binary: String,
    /// 스캐너 DB 캐시 디렉토리 (`~`는 `HOME`으로 확장)
    pub cache_dir: String,
    /// 스캔 1회 타임아웃 (초). 실제 강제 종료는 여기에 10초를 더한 시점
    pub timeout_secs: u64,
    /// 동시 실행 스캔 최대 수
    pub max_parallel_scans: usize,
    /// DB 초기화 타임아웃 (초)
    pub db_init_timeout_secs: u64,
    /// 캡처할 출력 최대 크기 (바이트)
    pub max_output_bytes: usize,
    /// 종료된 스캔의 임시 캐시 보존 시간 (초)
    pub cache_retention_secs: u64,
}

impl ScannerConfig {
    /// `~` 접두어를 확장한 캐시 디렉토리 경로를 반환합니다.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        expand_home(&self.cache_dir)
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            binary: "trivy".to_owned(),
            cache_dir: "~/.cache/trivy".to_owned(),
            timeout_secs: 300,
            max_parallel_scans: 3,
            db_init_timeout_secs: 60,
            max_output_bytes: 10 * 1024 * 1024,
            cache_retention_secs: 3600,
        }
    }
}

/// 스캔 레코드 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 저장소 백엔드 (memory, file)
    pub backend: String,
    /// file 백엔드의 레코드 디렉토리
    pub records_dir: String,
    /// 재시작 시 진행 중으로 남은 레코드 처리 정책 (keep, fail)
    pub orphan_policy: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "file".to_owned(),
            records_dir: "/var/lib/docklens/records".to_owned(),
            orphan_policy: "keep".to_owned(),
        }
    }
}

/// 사용자별 월간 스캔 한도
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// 월간 스캔 제출 한도 (0이면 무제한)
    pub monthly_scan_limit: u32,
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// `~` 또는 `~/...` 경로를 `HOME` 기준으로 확장합니다.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => {
            warn!(path, "HOME is not set, using path as-is");
            PathBuf::from(path)
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse {type_name} from env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
