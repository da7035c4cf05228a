//! 스캐너 출력 해석 벤치마크
//!
//! 취약점 수에 따른 JSON 파싱 및 심각도 집계 성능을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use docklens_scan_engine::interpreter::{count_severities, interpret};

const SEVERITIES: [&str; 6] = ["CRITICAL", "HIGH", "MEDIUM", "LOW", "UNKNOWN", "negligible"];

/// 결과 섹션 `targets`개, 섹션당 취약점 `per_target`개인 리포트
fn generate_report(targets: usize, per_target: usize) -> String {
    let results: Vec<String> = (0..targets)
        .map(|t| {
            let vulns: Vec<String> = (0..per_target)
                .map(|v| {
                    format!(
                        r#"{{"VulnerabilityID":"CVE-2024-{t:02}{v:04}","PkgName":"pkg-{v}","InstalledVersion":"1.0.{v}","Severity":"{}","Title":"synthetic finding"}}"#,
                        SEVERITIES[(t + v) % SEVERITIES.len()]
                    )
                })
                .collect();
            format!(
                r#"{{"Target":"layer-{t}","Class":"os-pkgs","Vulnerabilities":[{}]}}"#,
                vulns.join(",")
            )
        })
        .collect();
    format!(
        r#"{{"SchemaVersion":2,"ArtifactName":"bench:latest","Results":[{}]}}"#,
        results.join(",")
    )
}

fn bench_interpret(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpret");

    for total in [10usize, 1_000, 10_000] {
        let report = generate_report(4, total / 4);
        group.throughput(Throughput::Bytes(report.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(total), &report, |b, report| {
            b.iter(|| interpret(black_box(report.as_bytes())).unwrap())
        });
    }

    group.finish();
}

fn bench_count_only(c: &mut Criterion) {
    let report: serde_json::Value = serde_json::from_str(&generate_report(4, 2_500)).unwrap();

    let mut group = c.benchmark_group("count_severities");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("parsed_10000_findings", |b| {
        b.iter(|| count_severities(black_box(&report)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_interpret, bench_count_only);
criterion_main!(benches);
