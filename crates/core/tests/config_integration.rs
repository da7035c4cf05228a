//! docklens.toml 통합 설정 테스트
//!
//! - docklens.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use docklens_core::config::DocklensConfig;
use docklens_core::error::{ConfigError, DocklensError};

const EXAMPLE: &str = include_str!("../../../docklens.toml.example");

// =============================================================================
// docklens.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let config = DocklensConfig::parse(EXAMPLE).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.general.data_dir, "/var/lib/docklens");
    assert_eq!(config.general.pid_file, "/var/run/docklens/docklens.pid");
}

#[test]
fn example_config_passes_validation() {
    let config = DocklensConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_has_correct_scanner_defaults() {
    let config = DocklensConfig::parse(EXAMPLE).expect("should parse");

    assert_eq!(config.scanner.binary, "trivy");
    assert_eq!(config.scanner.cache_dir, "~/.cache/trivy");
    assert_eq!(config.scanner.timeout_secs, 300);
    assert_eq!(config.scanner.max_parallel_scans, 3);
    assert_eq!(config.scanner.db_init_timeout_secs, 60);
    assert_eq!(config.scanner.max_output_bytes, 10 * 1024 * 1024);
    assert_eq!(config.scanner.cache_retention_secs, 3600);
}

#[test]
fn example_config_has_correct_server_and_storage() {
    let config = DocklensConfig::parse(EXAMPLE).expect("should parse");

    assert_eq!(config.server.port, 3000);
    assert_eq!(config.server.allowed_origins, vec!["http://localhost:3001"]);
    assert_eq!(config.storage.backend, "file");
    assert_eq!(config.storage.records_dir, "/var/lib/docklens/records");
    assert_eq!(config.storage.orphan_policy, "keep");
    assert_eq!(config.quota.monthly_scan_limit, 0);
}

#[test]
fn example_matches_builtin_defaults() {
    let example = DocklensConfig::parse(EXAMPLE).expect("should parse");
    let defaults = DocklensConfig::default();

    assert_eq!(example.scanner.timeout_secs, defaults.scanner.timeout_secs);
    assert_eq!(
        example.scanner.max_parallel_scans,
        defaults.scanner.max_parallel_scans
    );
    assert_eq!(example.docker.socket_path, defaults.docker.socket_path);
    assert_eq!(example.metrics.port, defaults.metrics.port);
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn only_scanner_section_keeps_other_defaults() {
    let toml = r#"
[scanner]
binary = "/usr/local/bin/trivy"
max_parallel_scans = 8
"#;
    let config = DocklensConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert_eq!(config.scanner.binary, "/usr/local/bin/trivy");
    assert_eq!(config.scanner.max_parallel_scans, 8);
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.storage.backend, "file");
}

#[test]
fn memory_backend_does_not_require_records_dir() {
    let toml = r#"
[storage]
backend = "memory"
records_dir = ""
"#;
    let config = DocklensConfig::parse(toml).expect("should parse");
    config.validate().expect("memory backend should validate");
}

#[test]
fn file_backend_requires_records_dir() {
    let toml = r#"
[storage]
backend = "file"
records_dir = ""
"#;
    let config = DocklensConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        DocklensError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "storage.records_dir"
    ));
}

#[test]
fn quota_limit_parses() {
    let config = DocklensConfig::parse("[quota]\nmonthly_scan_limit = 10").expect("should parse");
    assert_eq!(config.quota.monthly_scan_limit, 10);
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[scanner]
max_parallel_scans = 2
"#;

    let original = std::env::var("DOCKLENS_SCANNER_MAX_PARALLEL_SCANS").ok();
    // SAFETY: serial 테스트로 환경변수 조작이 직렬화됩니다.
    unsafe {
        std::env::set_var("DOCKLENS_SCANNER_MAX_PARALLEL_SCANS", "6");
    }

    let mut config = DocklensConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.scanner.max_parallel_scans;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("DOCKLENS_SCANNER_MAX_PARALLEL_SCANS", val),
            None => std::env::remove_var("DOCKLENS_SCANNER_MAX_PARALLEL_SCANS"),
        }
    }

    assert_eq!(result, 6);
}

#[test]
#[serial_test::serial]
fn env_override_invalid_number_keeps_toml_value() {
    let toml = r#"
[server]
port = 8080
"#;

    let original = std::env::var("DOCKLENS_SERVER_PORT").ok();
    // SAFETY: serial 테스트로 환경변수 조작이 직렬화됩니다.
    unsafe {
        std::env::set_var("DOCKLENS_SERVER_PORT", "not-a-port");
    }

    let mut config = DocklensConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.server.port;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("DOCKLENS_SERVER_PORT", val),
            None => std::env::remove_var("DOCKLENS_SERVER_PORT"),
        }
    }

    assert_eq!(result, 8080);
}

#[test]
#[serial_test::serial]
fn env_override_allowed_origins_csv() {
    let original = std::env::var("DOCKLENS_SERVER_ALLOWED_ORIGINS").ok();
    // SAFETY: serial 테스트로 환경변수 조작이 직렬화됩니다.
    unsafe {
        std::env::set_var(
            "DOCKLENS_SERVER_ALLOWED_ORIGINS",
            "https://a.example, https://b.example",
        );
    }

    let mut config = DocklensConfig::parse("").expect("should parse");
    config.apply_env_overrides();
    let result = config.server.allowed_origins.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("DOCKLENS_SERVER_ALLOWED_ORIGINS", val),
            None => std::env::remove_var("DOCKLENS_SERVER_ALLOWED_ORIGINS"),
        }
    }

    assert_eq!(result, vec!["https://a.example", "https://b.example"]);
}

#[test]
#[serial_test::serial]
fn env_override_missing_var_keeps_toml_value() {
    let toml = r#"
[general]
log_level = "warn"
"#;

    // SAFETY: 존재하지 않는 변수를 명시적으로 제거
    unsafe {
        std::env::remove_var("DOCKLENS_GENERAL_LOG_LEVEL");
    }

    let mut config = DocklensConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();

    assert_eq!(config.general.log_level, "warn");
}

#[tokio::test]
#[serial_test::serial]
async fn load_rejects_env_value_that_fails_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("docklens.toml");
    std::fs::write(&path, "[storage]\nbackend = \"memory\"\n").expect("write config");

    // SAFETY: serial 테스트로 환경변수 조작이 직렬화됩니다.
    unsafe {
        std::env::set_var("DOCKLENS_STORAGE_ORPHAN_POLICY", "rescan");
    }
    let result = DocklensConfig::load(&path).await;
    // SAFETY: 테스트 정리
    unsafe {
        std::env::remove_var("DOCKLENS_STORAGE_ORPHAN_POLICY");
    }

    assert!(matches!(
        result.unwrap_err(),
        DocklensError::Config(ConfigError::InvalidValue { .. })
    ));
}

// =============================================================================
// 빈 파일 / 잘못된 형식 에러 테스트
// =============================================================================

#[test]
fn whitespace_only_parses_with_defaults() {
    let config = DocklensConfig::parse("   \n\n  \t  ").expect("whitespace should parse");
    config.validate().expect("should validate");
    assert_eq!(config.general.log_level, "info");
}

#[test]
fn invalid_type_returns_parse_error() {
    let toml = r#"
[metrics]
enabled = "not_a_bool"
"#;
    assert!(matches!(
        DocklensConfig::parse(toml).unwrap_err(),
        DocklensError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn wrong_type_for_numeric_field() {
    let toml = r#"
[scanner]
timeout_secs = "five minutes"
"#;
    assert!(matches!(
        DocklensConfig::parse(toml).unwrap_err(),
        DocklensError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let result = DocklensConfig::from_file("/tmp/docklens_test_nonexistent_12345.toml").await;
    assert!(matches!(
        result.unwrap_err(),
        DocklensError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
async fn from_file_reads_temp_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("docklens.toml");
    std::fs::write(&path, EXAMPLE).expect("write config");

    let config = DocklensConfig::from_file(&path).await.expect("should load");
    assert_eq!(config.scanner.binary, "trivy");
}

#[test]
fn example_config_serialize_roundtrip() {
    let config = DocklensConfig::parse(EXAMPLE).expect("should parse");
    let serialized = toml::to_string_pretty(&config).expect("should serialize");
    let reparsed = DocklensConfig::parse(&serialized).expect("should reparse");
    reparsed.validate().expect("should validate");

    assert_eq!(config.scanner.cache_dir, reparsed.scanner.cache_dir);
    assert_eq!(config.storage.orphan_policy, reparsed.storage.orphan_policy);
}
