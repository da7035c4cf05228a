// ---------------------------------------------------------------------------
// System routes
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use super::state::AppState;
use crate::health::DaemonHealth;

/// `GET /health`: 200 while scans can run, 503 otherwise.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<DaemonHealth>) {
    let health = DaemonHealth::collect(state.service.as_ref(), state.started_at).await;
    let code = if health.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(health))
}
