//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `docklens_`
//! - 영역: `scans_`, `scanner_`, `cache_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use docklens_core::metrics as m;
//! use metrics::counter;
//!
//! counter!(m::SCANS_SUBMITTED_TOTAL, m::LABEL_RESULT => "accepted").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 제출 결과 레이블 키 (accepted, capacity, duplicate, quota, not_found, error)
pub const LABEL_RESULT: &str = "result";

/// 종료 상태 레이블 키 (completed, failed)
pub const LABEL_STATUS: &str = "status";

// ─── 스캔 메트릭 ────────────────────────────────────────────────────

/// 스캔 제출 시도 수 (counter, label: result)
pub const SCANS_SUBMITTED_TOTAL: &str = "docklens_scans_submitted_total";

/// 종료된 스캔 수 (counter, label: status)
pub const SCANS_FINISHED_TOTAL: &str = "docklens_scans_finished_total";

/// 현재 실행 중인 스캔 수 (gauge)
pub const SCANS_IN_FLIGHT: &str = "docklens_scans_in_flight";

/// 스캔 1건의 소요 시간 (histogram, 초)
pub const SCAN_DURATION_SECONDS: &str = "docklens_scan_duration_seconds";

/// 대체 참조로 재시도한 스캔 수 (counter)
pub const SCANNER_FALLBACK_TOTAL: &str = "docklens_scanner_fallback_total";

/// 임시 캐시 항목 수 (gauge)
pub const CACHE_ENTRIES: &str = "docklens_cache_entries";

// ─── 데몬 메트릭 ────────────────────────────────────────────────────

/// 데몬 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "docklens_daemon_uptime_seconds";

/// 빌드 정보 (gauge, 항상 1)
pub const DAEMON_BUILD_INFO: &str = "docklens_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 스캔 소요 시간 히스토그램 버킷 (초)
///
/// 1s ~ 600s 범위 (이미지 레이어 분석 포함)
pub const SCAN_DURATION_BUCKETS: [f64; 9] = [1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 180.0, 300.0, 600.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `docklens-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Scans
    describe_counter!(
        SCANS_SUBMITTED_TOTAL,
        "Total number of scan submissions by outcome"
    );
    describe_counter!(
        SCANS_FINISHED_TOTAL,
        "Total number of scans that reached a terminal status"
    );
    describe_gauge!(SCANS_IN_FLIGHT, "Number of scans currently holding a slot");
    describe_histogram!(
        SCAN_DURATION_SECONDS,
        "Time from admission to terminal status in seconds"
    );
    describe_counter!(
        SCANNER_FALLBACK_TOTAL,
        "Total number of scans retried with the image id"
    );
    describe_gauge!(CACHE_ENTRIES, "Number of entries in the in-memory scan cache");

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Docklens daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version/commit labels)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        SCANS_SUBMITTED_TOTAL,
        SCANS_FINISHED_TOTAL,
        SCANS_IN_FLIGHT,
        SCAN_DURATION_SECONDS,
        SCANNER_FALLBACK_TOTAL,
        CACHE_ENTRIES,
        DAEMON_UPTIME_SECONDS,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_docklens_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("docklens_"),
                "Metric '{}' does not start with 'docklens_' prefix",
                name
            );
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = ALL_METRIC_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더 없이 호출해도 패닉하지 않아야 함
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_RESULT, LABEL_STATUS] {
            assert_eq!(label.to_lowercase(), label);
        }
    }

    #[test]
    fn scan_duration_buckets_are_sorted() {
        let buckets = SCAN_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(
                buckets[i] > buckets[i - 1],
                "Bucket values must be in ascending order"
            );
        }
    }
}
