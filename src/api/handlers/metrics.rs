//! Evaluation metrics handlers

use axum::extract::Query;
use axum::extract::State;
use axum::Json;
use tracing::info;

use super::ApiResult;
use super::AppState;
use crate::api::types::ApiResponse;
use crate::api::types::MetricsQuery;
use crate::api::types::MetricsReply;

/// GET /api/metrics/summary
pub async fn metrics_summary(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<MetricsReply> {
    let days = query.days.unwrap_or(7).clamp(1, 90);
    info!("GET /api/metrics/summary days={}", days);

    let summary = state.database.metrics_summary(days).await?;
    Ok(Json(ApiResponse::success(MetricsReply::from(summary))))
}
