// ---------------------------------------------------------------------------
// HTTP API: route registration
// ---------------------------------------------------------------------------

pub mod error;
pub mod scans;
pub mod state;
mod system;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use docklens_core::config::ServerConfig;

pub use error::{ApiError, ApiErrorBody};
pub use state::AppState;

/// Build the axum router for the scan API.
///
/// `/scans/history` and `/scans/summary` are static segments and win over
/// the `/scans/{id}` capture.
pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Result<Router> {
    let routes = Router::new()
        .route("/health", get(system::health_check))
        .route("/scans/history", get(scans::scan_history))
        .route("/scans/summary", get(scans::scan_summary))
        .route("/scans/{id}", post(scans::submit_scan))
        .route("/scans/{id}/status", get(scans::scan_status));

    Ok(routes
        .layer(cors_layer(&config.allowed_origins)?)
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins = allowed_origins
            .iter()
            .map(|o| {
                o.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("invalid CORS origin '{}': {}", o, e))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(scans::OWNER_HEADER),
        ])
        .max_age(Duration::from_secs(3600)))
}
