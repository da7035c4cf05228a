//! API error type and its JSON response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use docklens_scan_engine::{MonthlyQuota, ScanEngineError};

/// Error body: `{error, message, scanId?}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    /// 429: every admission slot is taken.
    CapacityExceeded { limit: usize },
    /// 404: the image is not present in the local runtime.
    ImageNotFound(String),
    /// 409: a scan for the same image is still pending or running.
    ScanAlreadyInProgress { scan_id: String },
    /// 403: the owner used up the monthly allowance.
    QuotaExceeded { limit: u32 },
    /// 400: malformed image reference.
    InvalidImageRef(String),
    /// 404: unknown scan id.
    NotFound,
    /// 403: the scan belongs to another owner.
    Forbidden,
    /// 401: owner-scoped route called without `X-Owner-Id`.
    Unauthorized(String),
    /// 500: anything else. The detail is logged, never returned.
    Internal(String),
}

impl From<ScanEngineError> for ApiError {
    fn from(err: ScanEngineError) -> Self {
        match err {
            ScanEngineError::CapacityExceeded { limit } => Self::CapacityExceeded { limit },
            ScanEngineError::ImageNotFound(image_ref) => Self::ImageNotFound(image_ref),
            ScanEngineError::ScanAlreadyInProgress { scan_id } => {
                Self::ScanAlreadyInProgress { scan_id }
            }
            ScanEngineError::QuotaExceeded { limit, .. } => Self::QuotaExceeded { limit },
            ScanEngineError::InvalidImageRef(reason) => Self::InvalidImageRef(reason),
            ScanEngineError::NotFound(_) => Self::NotFound,
            ScanEngineError::Forbidden { .. } => Self::Forbidden,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut scan_id = None;
        let (status, error_key, message) = match self {
            ApiError::CapacityExceeded { limit } => (
                StatusCode::TOO_MANY_REQUESTS,
                "capacity_exceeded",
                format!(
                    "Maximum of {limit} concurrent scans allowed. Please try again later."
                ),
            ),
            ApiError::ImageNotFound(image_ref) => (
                StatusCode::NOT_FOUND,
                "image_not_found",
                format!("The image '{image_ref}' was not found locally. Please ensure it exists."),
            ),
            ApiError::ScanAlreadyInProgress { scan_id: existing } => {
                scan_id = Some(existing);
                (
                    StatusCode::CONFLICT,
                    "scan_already_in_progress",
                    "A scan is already running for this image. Please wait for it to complete."
                        .to_owned(),
                )
            }
            ApiError::QuotaExceeded { limit } => (
                StatusCode::FORBIDDEN,
                "quota_exceeded",
                MonthlyQuota::new(limit).message(),
            ),
            ApiError::InvalidImageRef(reason) => (
                StatusCode::BAD_REQUEST,
                "invalid_image_ref",
                format!("invalid image reference: {reason}"),
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "not_found",
                "No scan found with the provided ID".to_owned(),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "You do not have permission to access this scan".to_owned(),
            ),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Internal(msg) => {
                tracing::error!(details = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_owned(),
                )
            }
        };

        (
            status,
            Json(ApiErrorBody {
                error: error_key.to_owned(),
                message,
                scan_id,
            }),
        )
            .into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::CapacityExceeded { limit } => write!(f, "capacity exceeded ({limit})"),
            ApiError::ImageNotFound(image_ref) => write!(f, "image not found: {image_ref}"),
            ApiError::ScanAlreadyInProgress { scan_id } => {
                write!(f, "scan already in progress: {scan_id}")
            }
            ApiError::QuotaExceeded { limit } => write!(f, "quota exceeded ({limit}/month)"),
            ApiError::InvalidImageRef(reason) => write!(f, "invalid image reference: {reason}"),
            ApiError::NotFound => write!(f, "scan not found"),
            ApiError::Forbidden => write!(f, "forbidden"),
            ApiError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            ApiError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}
