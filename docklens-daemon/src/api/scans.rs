// ---------------------------------------------------------------------------
// Scan routes
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;

use docklens_core::types::ScanRecord;
use docklens_scan_engine::{HistoryPage, PageRequest, ScanSummary};

use super::error::ApiError;
use super::state::AppState;

/// Caller identity header.
pub const OWNER_HEADER: &str = "x-owner-id";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScanResponse {
    pub scan_id: String,
    pub status: &'static str,
}

/// Trimmed `X-Owner-Id`, if present and non-empty.
pub fn owner_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn require_owner(headers: &HeaderMap) -> Result<String, ApiError> {
    owner_id(headers).ok_or_else(|| ApiError::Unauthorized("missing X-Owner-Id header".to_owned()))
}

// POST /scans/{imageRef}

pub async fn submit_scan(
    State(state): State<Arc<AppState>>,
    Path(image_ref): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<SubmitScanResponse>), ApiError> {
    let owner = owner_id(&headers);
    let scan_id = state
        .service
        .submit(&image_ref, owner.as_deref())
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitScanResponse {
            scan_id,
            status: "started",
        }),
    ))
}

// GET /scans/{scanId}/status

pub async fn scan_status(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ScanRecord>, ApiError> {
    let caller = owner_id(&headers);
    let record = state.service.status(&scan_id, caller.as_deref()).await?;
    Ok(Json(record))
}

// GET /scans/history?page&limit

pub async fn scan_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(request): Query<PageRequest>,
) -> Result<Json<HistoryPage>, ApiError> {
    let owner = require_owner(&headers)?;
    let page = state.service.history(&owner, request).await?;
    Ok(Json(page))
}

// GET /scans/summary

pub async fn scan_summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ScanSummary>, ApiError> {
    let owner = require_owner(&headers)?;
    let summary = state.service.summary(&owner).await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn owner_id_is_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert(OWNER_HEADER, HeaderValue::from_static("  user-1 "));
        assert_eq!(owner_id(&headers).as_deref(), Some("user-1"));
    }

    #[test]
    fn blank_owner_id_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(OWNER_HEADER, HeaderValue::from_static("   "));
        assert!(owner_id(&headers).is_none());
        assert!(matches!(
            require_owner(&headers),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn missing_owner_id_is_absent() {
        assert!(owner_id(&HeaderMap::new()).is_none());
    }
}
