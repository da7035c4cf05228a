//! Prometheus metrics exporter.
//!
//! Uses the built-in HTTP listener of `metrics-exporter-prometheus`.
//! The scrape endpoint runs on its own port, separate from the scan API.

use std::net::SocketAddr;

use anyhow::Result;
use docklens_core::config::MetricsConfig;
use docklens_core::metrics as m;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

/// Install the global metrics recorder and start the HTTP listener.
///
/// Call once per process. Afterwards every `metrics::counter!()`,
/// `metrics::gauge!()` and `metrics::histogram!()` call is exported.
///
/// # Errors
///
/// - Unsupported endpoint path or unparsable address
/// - Socket binding fails or a recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = metrics_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(m::SCAN_DURATION_SECONDS.to_owned()),
            &m::SCAN_DURATION_BUCKETS,
        )
        .map_err(|e| anyhow::anyhow!("invalid histogram buckets: {}", e))?
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    m::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}

/// Resolve the exporter socket address from config.
pub fn metrics_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != "/metrics" {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '/metrics' is currently supported",
            config.endpoint
        ));
    }

    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}
