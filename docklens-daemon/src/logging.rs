//! Logging initialization for docklens-daemon.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `DocklensConfig`. `RUST_LOG` takes precedence over `general.log_level`.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use docklens_core::config::GeneralConfig;

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before the daemon starts serving.
///
/// # Formats
///
/// * `"json"` - JSON lines (default)
/// * `"pretty"` - human-readable output for development
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e)),
        "pretty" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| {
                anyhow::anyhow!("failed to initialize pretty tracing subscriber: {}", e)
            }),
        other => Err(anyhow::anyhow!(
            "unknown log format '{}', expected 'json' or 'pretty'",
            other
        )),
    }
}
