//! Process lifecycle helpers: PID file, shutdown signals, daemon metrics.

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::watch;

use docklens_core::metrics as m;

/// Install SIGTERM/SIGINT handlers and return a future that resolves with
/// the name of the first signal received.
///
/// Handlers are registered before this returns, so a signal delivered while
/// the daemon is still binding is not lost.
pub fn install_shutdown_signals() -> Result<impl Future<Output = &'static str> + Send> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Write the current process PID to `path`.
///
/// # Security
///
/// - `create_new(true)` makes creation atomic, so a second instance fails
/// - the created file must be a regular file
/// - the parent directory is created with mode 0o700, the file with 0o600
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(0o700)
                .recursive(true)
                .create(parent)?;
        }
        #[cfg(not(unix))]
        fs::create_dir_all(parent)?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = match options.open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    writeln!(file, "{}", std::process::id())?;
    file.sync_all()?;

    tracing::info!(path = %path.display(), pid = std::process::id(), "PID file written");
    Ok(())
}

/// Remove the PID file, logging instead of failing.
pub fn remove_pid_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "PID file removed"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file"),
    }
}

/// Record static daemon gauges.
pub fn record_daemon_metrics() {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Periodically refresh the uptime gauge until `shutdown` flips to true.
pub fn spawn_uptime_updater(
    started_at: Instant,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(started_at.elapsed().as_secs() as f64);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("uptime updater shutting down");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uptime_updater_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let handle = spawn_uptime_updater(Instant::now(), rx);

        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("updater should exit")
            .unwrap();
    }

    #[tokio::test]
    async fn uptime_updater_stops_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        let handle = spawn_uptime_updater(Instant::now(), rx);

        drop(tx);
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("updater should exit")
            .unwrap();
    }

    #[test]
    fn record_daemon_metrics_without_recorder() {
        record_daemon_metrics();
    }
}
