//! API request handlers

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use tracing::error;

use crate::api::types::ApiResponse;
use crate::api::types::HealthResponse;
use crate::database::Database;
use crate::errors::LexRagError;
use crate::rag::AskService;
use crate::tasks::TaskQueue;

pub mod chat;
pub mod knowledge;
pub mod metrics;

pub use chat::*;
pub use knowledge::*;
pub use metrics::*;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub database: Arc<Database>,
    pub ask_service: Arc<AskService>,
    pub queue: TaskQueue,
}

/// Handler error carrying the HTTP status it maps to
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<LexRagError> for ApiError {
    fn from(error: LexRagError) -> Self {
        match error {
            LexRagError::InvalidInput(message) => Self {
                status: StatusCode::BAD_REQUEST,
                message,
            },
            LexRagError::NotFound(message) => Self {
                status: StatusCode::NOT_FOUND,
                message,
            },
            // No detail about conversations the caller does not own
            LexRagError::Forbidden(_) => Self {
                status: StatusCode::FORBIDDEN,
                message: "Forbidden".to_string(),
            },
            other => {
                error!("Request failed: {}", other);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Something went wrong. Please try again.".to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

/// Caller identity from the fronting proxy
pub fn require_user_id(headers: &HeaderMap) -> Result<i64, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .ok_or_else(|| ApiError::bad_request("x-user-id header required"))
}

/// Safe mode is opt-in per request via `x-safe-mode: 1`
pub fn safe_mode_on(headers: &HeaderMap) -> bool {
    headers
        .get("x-safe-mode")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        == Some("1")
}

/// Health check handler
pub async fn health() -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
