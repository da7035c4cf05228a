//! 스캐너 JSON 출력 해석
//!
//! 리포트의 모든 `Results[].Vulnerabilities[].Severity`를 순회하며 심각도별로 집계합니다.
//!
//! - 파싱할 수 없는 입력 → `ScanEngineError::Parse` (부분 집계 없음)
//! - `Results`/`Vulnerabilities`가 없거나 null → 0으로 집계
//! - 알 수 없는 심각도(`UNKNOWN`, `negligible` 등) → 집계에서 제외

use serde::Deserialize;
use serde_json::Value;

use docklens_core::types::{Severity, VulnerabilityCounts};

use crate::error::ScanEngineError;

/// 해석 결과
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    /// 심각도별 집계
    pub counts: VulnerabilityCounts,
    /// 원본 리포트 (감사용으로 보존)
    pub report: Value,
}

#[derive(Debug, Deserialize)]
struct TrivyReport {
    #[serde(rename = "Results")]
    results: Option<Vec<TrivyResult>>,
}

#[derive(Debug, Deserialize)]
struct TrivyResult {
    #[serde(rename = "Vulnerabilities")]
    vulnerabilities: Option<Vec<TrivyVulnerability>>,
}

#[derive(Debug, Deserialize)]
struct TrivyVulnerability {
    #[serde(rename = "Severity")]
    severity: Option<String>,
}

/// 스캐너 출력을 해석합니다.
pub fn interpret(raw: &[u8]) -> Result<Interpretation, ScanEngineError> {
    let report: Value =
        serde_json::from_slice(raw).map_err(|e| ScanEngineError::Parse(e.to_string()))?;
    let counts = count_severities(&report)?;
    Ok(Interpretation { counts, report })
}

/// 이미 파싱된 리포트에서 심각도를 집계합니다.
pub fn count_severities(report: &Value) -> Result<VulnerabilityCounts, ScanEngineError> {
    let mut counts = VulnerabilityCounts::default();

    let typed = match report {
        Value::Object(_) => {
            TrivyReport::deserialize(report).map_err(|e| ScanEngineError::Parse(e.to_string()))?
        }
        Value::Null => return Err(ScanEngineError::Parse("empty report".to_owned())),
        // 객체가 아닌 최상위 값에는 결과 섹션이 없음
        _ => return Ok(counts),
    };

    for result in typed.results.into_iter().flatten() {
        for vuln in result.vulnerabilities.into_iter().flatten() {
            if let Some(severity) = vuln.severity.as_deref().and_then(Severity::from_label) {
                counts.record(severity);
            }
        }
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn report_with(severities: &[&str]) -> String {
        let vulns: Vec<String> = severities
            .iter()
            .enumerate()
            .map(|(i, s)| format!(r#"{{"VulnerabilityID":"CVE-2024-{i:04}","Severity":"{s}"}}"#))
            .collect();
        format!(
            r#"{{"SchemaVersion":2,"ArtifactName":"nginx:1.27","Results":[{{"Target":"nginx:1.27 (debian 12.6)","Vulnerabilities":[{}]}}]}}"#,
            vulns.join(",")
        )
    }

    #[test]
    fn counts_each_bucket() {
        let raw = report_with(&["CRITICAL", "HIGH", "HIGH", "MEDIUM", "LOW", "LOW", "LOW"]);
        let result = interpret(raw.as_bytes()).unwrap();
        assert_eq!(
            result.counts,
            VulnerabilityCounts {
                critical: 1,
                high: 2,
                medium: 1,
                low: 3
            }
        );
        assert_eq!(result.report["ArtifactName"], "nginx:1.27");
    }

    #[test]
    fn severity_match_is_case_insensitive() {
        let raw = report_with(&["critical", "High", "mEdIuM", "low"]);
        let counts = interpret(raw.as_bytes()).unwrap().counts;
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.medium, 1);
    }

    #[test]
    fn unknown_severities_are_dropped() {
        let raw = report_with(&["UNKNOWN", "negligible", "HIGH", ""]);
        let counts = interpret(raw.as_bytes()).unwrap().counts;
        assert_eq!(counts.high, 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn missing_severity_field_is_dropped() {
        let raw = r#"{"Results":[{"Vulnerabilities":[{"VulnerabilityID":"CVE-1"},{"Severity":null},{"Severity":"LOW"}]}]}"#;
        let counts = interpret(raw.as_bytes()).unwrap().counts;
        assert_eq!(counts.low, 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn counts_across_multiple_results() {
        let raw = r#"{"Results":[
            {"Target":"os","Vulnerabilities":[{"Severity":"CRITICAL"}]},
            {"Target":"node-pkg","Class":"lang-pkgs"},
            {"Target":"jar","Vulnerabilities":null},
            {"Target":"gobinary","Vulnerabilities":[{"Severity":"HIGH"},{"Severity":"CRITICAL"}]}
        ]}"#;
        let counts = interpret(raw.as_bytes()).unwrap().counts;
        assert_eq!(counts.critical, 2);
        assert_eq!(counts.high, 1);
    }

    #[test]
    fn absent_results_yield_zero_counts() {
        for raw in [
            r#"{"SchemaVersion":2,"ArtifactName":"scratch"}"#,
            r#"{"Results":null}"#,
            r#"{"Results":[]}"#,
            "[]",
        ] {
            let counts = interpret(raw.as_bytes()).unwrap().counts;
            assert_eq!(counts, VulnerabilityCounts::default(), "input: {raw}");
        }
    }

    #[test]
    fn malformed_input_is_parse_error() {
        for raw in ["", "not json", r#"{"Results":[{"#, "null"] {
            let err = interpret(raw.as_bytes()).unwrap_err();
            assert!(matches!(err, ScanEngineError::Parse(_)), "input: {raw:?}");
        }
    }

    #[test]
    fn wrong_shape_is_parse_error() {
        let err = interpret(br#"{"Results":"none"}"#).unwrap_err();
        assert!(matches!(err, ScanEngineError::Parse(_)));
    }

    fn label() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("CRITICAL".to_owned()),
            Just("high".to_owned()),
            Just("Medium".to_owned()),
            Just("LOW".to_owned()),
            Just("UNKNOWN".to_owned()),
            "[a-z]{0,8}",
        ]
    }

    proptest! {
        #[test]
        fn total_never_exceeds_findings(labels in proptest::collection::vec(label(), 0..64)) {
            let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
            let counts = interpret(report_with(&refs).as_bytes()).unwrap().counts;
            let known = labels
                .iter()
                .filter(|l| Severity::from_label(l).is_some())
                .count() as u64;
            prop_assert_eq!(counts.total(), known);
            prop_assert!(counts.total() <= labels.len() as u64);
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = interpret(&bytes);
        }
    }
}
