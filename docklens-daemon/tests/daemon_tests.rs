//! Serve loop and shutdown tests over a real TCP listener.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use docklens_core::config::DocklensConfig;
use docklens_core::service::{BoxFuture, HealthStatus};
use docklens_core::types::ScanRecord;
use docklens_daemon::daemon::{Daemon, drain_scans};
use docklens_daemon::health::DaemonHealth;
use docklens_scan_engine::{HistoryPage, PageRequest, ScanEngineError, ScanService, ScanSummary};

/// Service whose only moving part is the in-flight counter.
struct IdleService {
    in_flight: AtomicUsize,
    health: HealthStatus,
}

impl IdleService {
    fn new(in_flight: usize) -> Self {
        Self {
            in_flight: AtomicUsize::new(in_flight),
            health: HealthStatus::Healthy,
        }
    }
}

impl ScanService for IdleService {
    fn submit<'a>(
        &'a self,
        _image_ref: &'a str,
        _owner_id: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ScanEngineError>> {
        Box::pin(async { Err(ScanEngineError::CapacityExceeded { limit: 1 }) })
    }

    fn status<'a>(
        &'a self,
        scan_id: &'a str,
        _caller: Option<&'a str>,
    ) -> BoxFuture<'a, Result<ScanRecord, ScanEngineError>> {
        Box::pin(async move { Err(ScanEngineError::NotFound(scan_id.to_owned())) })
    }

    fn history<'a>(
        &'a self,
        _owner_id: &'a str,
        request: PageRequest,
    ) -> BoxFuture<'a, Result<HistoryPage, ScanEngineError>> {
        Box::pin(async move { Ok(docklens_scan_engine::reports::paginate(&[], request)) })
    }

    fn summary<'a>(
        &'a self,
        _owner_id: &'a str,
    ) -> BoxFuture<'a, Result<ScanSummary, ScanEngineError>> {
        Box::pin(async {
            Ok(docklens_scan_engine::reports::summarize(
                &[],
                chrono::Utc::now(),
            ))
        })
    }

    fn health(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(async move { self.health.clone() })
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn max_parallel_scans(&self) -> usize {
        1
    }
}

async fn raw_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn serves_until_shutdown_future_resolves() {
    // Given: A daemon bound to an ephemeral port
    let daemon = Daemon::with_service(DocklensConfig::default(), Arc::new(IdleService::new(0)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        daemon
            .serve_until(listener, async {
                let _ = stop_rx.await;
            })
            .await
    });

    // When: Querying health, then signalling shutdown
    let response = raw_get(addr, "/health").await;
    stop_tx.send(()).unwrap();

    // Then: The request was served and the loop exits cleanly
    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.contains("\"status\":\"healthy\""));
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server should stop")
        .unwrap();
    assert!(result.is_ok(), "serve_until failed: {result:?}");
}

#[tokio::test]
async fn invalid_cors_origin_fails_before_serving() {
    // Given: A config with an origin that is not a valid header value
    let mut config = DocklensConfig::default();
    config.server.allowed_origins = vec!["http://bad\norigin".to_owned()];
    let daemon = Daemon::with_service(config, Arc::new(IdleService::new(0)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    // When / Then: serve_until returns the router error
    let err = daemon
        .serve_until(listener, async {})
        .await
        .expect_err("router build should fail");
    assert!(err.to_string().contains("invalid CORS origin"));
}

#[tokio::test]
async fn drain_returns_immediately_when_idle() {
    let service = IdleService::new(0);
    let remaining = drain_scans(&service, Duration::from_secs(30)).await;
    assert_eq!(remaining, 0);
}

#[tokio::test(start_paused = true)]
async fn drain_gives_up_after_timeout() {
    // Given: Two scans that never finish
    let service = IdleService::new(2);

    // When: Draining with a 1s budget
    let remaining = drain_scans(&service, Duration::from_secs(1)).await;

    // Then: The stragglers are reported
    assert_eq!(remaining, 2);
}

#[tokio::test(start_paused = true)]
async fn drain_waits_for_running_scans() {
    // Given: One running scan that finishes after 2s
    let service = Arc::new(IdleService::new(1));
    let finisher = Arc::clone(&service);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        finisher.in_flight.store(0, Ordering::SeqCst);
    });

    // When: Draining with a 30s budget
    let remaining = drain_scans(service.as_ref(), Duration::from_secs(30)).await;

    // Then: It returns once the scan is done
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn health_report_reflects_service() {
    // Given: A degraded service with one running scan
    let service = IdleService {
        in_flight: AtomicUsize::new(1),
        health: HealthStatus::Degraded("at capacity (1 scans running)".to_owned()),
    };

    // When: Collecting the report
    let health = DaemonHealth::collect(&service, Instant::now()).await;

    // Then: Status and counters are carried over
    assert!(health.is_serving());
    assert_eq!(health.in_flight, 1);
    assert_eq!(health.max_parallel_scans, 1);

    let json = serde_json::to_value(&health).unwrap();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["reason"], "at capacity (1 scans running)");
    assert_eq!(json["maxParallelScans"], 1);
}

#[tokio::test]
async fn unhealthy_service_is_not_serving() {
    let service = IdleService {
        in_flight: AtomicUsize::new(0),
        health: HealthStatus::Unhealthy("docker unreachable".to_owned()),
    };
    let health = DaemonHealth::collect(&service, Instant::now()).await;
    assert!(!health.is_serving());
}
