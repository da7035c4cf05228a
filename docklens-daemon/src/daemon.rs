//! Daemon assembly and run loop.
//!
//! Builds the scan engine from `DocklensConfig`, serves the HTTP API until a
//! shutdown signal arrives, then waits a bounded time for running scans.
//!
//! # Startup sequence
//!
//! 1. Validate configuration
//! 2. Install the metrics exporter (when enabled)
//! 3. Open the record store (`memory` or `file`)
//! 4. Build the orchestrator and reconcile orphaned records
//! 5. Write the PID file, bind, serve

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;

use docklens_core::config::{DocklensConfig, expand_home};
use docklens_image_gateway::BollardImageGateway;
use docklens_scan_engine::{
    FileRecordStore, MemoryRecordStore, ScanEngineConfig, ScanOrchestrator, ScanRecordStore,
    ScanService, TokioProcessRunner,
};

use crate::api::{AppState, build_router};
use crate::cli::DaemonCli;
use crate::lifecycle::{
    install_shutdown_signals, record_daemon_metrics, remove_pid_file, spawn_uptime_updater,
    write_pid_file,
};
use crate::metrics_server::install_metrics_recorder;

/// Upper bound on waiting for running scans after the listener closes.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Load configuration for the given CLI arguments and apply CLI overrides.
///
/// The built-in default path may be missing; an explicit path may not.
pub async fn load_config(cli: &DaemonCli) -> Result<DocklensConfig> {
    let mut config = if cli.uses_default_config() {
        DocklensConfig::load_or_default(&cli.config).await
    } else {
        DocklensConfig::load(&cli.config).await
    }
    .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;

    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;
    Ok(config)
}

/// A configured daemon, ready to serve.
pub struct Daemon {
    config: DocklensConfig,
    service: Arc<dyn ScanService>,
}

impl Daemon {
    /// Build every component from configuration.
    pub async fn build(config: DocklensConfig) -> Result<Self> {
        config.validate()?;

        if config.metrics.enabled {
            install_metrics_recorder(&config.metrics)?;
        }
        record_daemon_metrics();

        let gateway = Arc::new(
            BollardImageGateway::from_config(&config.docker)
                .map_err(|e| anyhow::anyhow!("failed to create docker client: {}", e))?,
        );
        let engine_config = ScanEngineConfig::from_core(&config);

        let service = match config.storage.backend.as_str() {
            "memory" => {
                tracing::warn!("memory record store selected; scan records will not survive restart");
                assemble(engine_config, gateway, Arc::new(MemoryRecordStore::new())).await?
            }
            "file" => {
                let dir = expand_home(&config.storage.records_dir);
                let store = tokio::task::spawn_blocking(move || FileRecordStore::open(dir))
                    .await?
                    .map_err(|e| anyhow::anyhow!("failed to open record store: {}", e))?;
                tracing::info!(dir = %store.dir().display(), "file record store opened");
                assemble(engine_config, gateway, Arc::new(store)).await?
            }
            other => return Err(anyhow::anyhow!("unknown storage backend '{}'", other)),
        };

        Ok(Self { config, service })
    }

    /// Wrap an existing service, skipping component construction.
    pub fn with_service(config: DocklensConfig, service: Arc<dyn ScanService>) -> Self {
        Self { config, service }
    }

    pub fn config(&self) -> &DocklensConfig {
        &self.config
    }

    pub fn service(&self) -> Arc<dyn ScanService> {
        Arc::clone(&self.service)
    }

    /// Build the HTTP router over this daemon's service.
    pub fn router(&self) -> Result<Router> {
        build_router(
            Arc::new(AppState::new(self.service())),
            &self.config.server,
        )
    }

    /// Run until SIGTERM/SIGINT, managing the PID file around the serve loop.
    pub async fn run(self) -> Result<()> {
        let pid_path = (!self.config.general.pid_file.is_empty())
            .then(|| PathBuf::from(&self.config.general.pid_file));
        if let Some(path) = &pid_path {
            write_pid_file(path)?;
        }

        let result = self.serve_on_signal().await;

        if let Some(path) = &pid_path {
            remove_pid_file(path);
        }
        result
    }

    async fn serve_on_signal(&self) -> Result<()> {
        let signals = install_shutdown_signals()?;
        let addr = format!(
            "{}:{}",
            self.config.server.listen_addr, self.config.server.port
        );
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", addr, e))?;

        self.serve_until(listener, async move {
            let signal = signals.await;
            tracing::info!(signal, "shutdown signal received");
        })
        .await
    }

    /// Serve on `listener` until `shutdown` resolves, then drain running scans.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let started_at = Instant::now();
        let router = self.router()?;
        let local_addr = listener.local_addr()?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let uptime = spawn_uptime_updater(started_at, stop_rx);

        tracing::info!(
            listen_addr = %local_addr,
            max_parallel_scans = self.service.max_parallel_scans(),
            version = env!("CARGO_PKG_VERSION"),
            "docklens-daemon listening"
        );

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        let _ = stop_tx.send(true);
        if let Err(e) = uptime.await {
            tracing::warn!(error = %e, "uptime updater task failed");
        }

        served.map_err(|e| anyhow::anyhow!("http server error: {}", e))?;

        let remaining = drain_scans(self.service.as_ref(), DRAIN_TIMEOUT).await;
        if remaining > 0 {
            tracing::warn!(
                remaining,
                "shutting down with scans still running; they will be reconciled on next start"
            );
        }

        tracing::info!(uptime_secs = started_at.elapsed().as_secs(), "docklens-daemon stopped");
        Ok(())
    }
}

async fn assemble<S: ScanRecordStore>(
    config: ScanEngineConfig,
    gateway: Arc<BollardImageGateway>,
    store: Arc<S>,
) -> Result<Arc<dyn ScanService>> {
    let orchestrator = ScanOrchestrator::new(config, gateway, Arc::new(TokioProcessRunner), store)?;

    let orphans = orchestrator.reconcile_orphans().await?;
    if orphans > 0 {
        tracing::info!(orphans, "orphaned scan records reconciled");
    }

    Ok(Arc::new(orchestrator))
}

/// Wait until no scan holds a slot or `timeout` passes. Returns the count still running.
pub async fn drain_scans(service: &dyn ScanService, timeout: Duration) -> usize {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let in_flight = service.in_flight();
        if in_flight == 0 || tokio::time::Instant::now() >= deadline {
            return in_flight;
        }
        tracing::debug!(in_flight, "waiting for running scans");
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}
