//! Knowledge source administration handlers

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use super::ApiError;
use super::ApiResult;
use super::AppState;
use crate::api::types::ApiResponse;
use crate::api::types::OkReply;
use crate::api::types::PageQuery;
use crate::api::types::SourceCreated;
use crate::api::types::SourceItem;
use crate::api::types::SourcePage;
use crate::api::types::SubmitSourceBody;
use crate::models::NewSource;
use crate::models::SourceStatus;
use crate::tasks::ingestion;
use crate::tasks::ingestion::MAX_INGEST_RETRIES;

/// POST /api/knowledge/sources
pub async fn submit_source(
    State(state): State<AppState>,
    Json(body): Json<SubmitSourceBody>,
) -> Result<(StatusCode, Json<ApiResponse<SourceCreated>>), ApiError> {
    info!("POST /api/knowledge/sources title={:?}", body.title);

    let source = ingestion::submit_source(
        &state.database,
        &state.queue,
        NewSource {
            title: body.title,
            source_type: body.source_type.unwrap_or_else(|| "txt".to_string()),
            locator: body.locator.unwrap_or_else(|| "inline".to_string()),
            language: body.language.unwrap_or_else(|| "en".to_string()),
            chunk_texts: body.chunks,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(SourceCreated { id: source.id })),
    ))
}

/// GET /api/knowledge/sources
pub async fn list_sources(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<SourcePage> {
    let (page, limit) = query.clamp(50, 200);
    info!("GET /api/knowledge/sources page={}", page);

    let sources = state
        .database
        .list_sources(limit, (page - 1) * limit)
        .await?;
    let total = state.database.count_sources().await?;

    Ok(Json(ApiResponse::success(SourcePage {
        page,
        limit,
        total,
        items: sources.into_iter().map(SourceItem::from).collect(),
    })))
}

/// POST /api/knowledge/sources/:id/retry
///
/// Manual retry is allowed only from `queued` or `failed` and under the
/// retry budget; `invalid` is a permanent input problem and `done` has
/// nothing left to do.
pub async fn retry_source(
    State(state): State<AppState>,
    Path(source_id): Path<i64>,
) -> ApiResult<OkReply> {
    info!("POST /api/knowledge/sources/{}/retry", source_id);

    let source = state
        .database
        .get_source(source_id)
        .await?
        .ok_or_else(|| ApiError {
            status: StatusCode::NOT_FOUND,
            message: "Knowledge source not found".to_string(),
        })?;

    match source.status() {
        SourceStatus::Invalid => {
            return Err(ApiError::bad_request(
                "This source is invalid and cannot be retried.",
            ));
        }
        SourceStatus::Done => {
            return Err(ApiError::bad_request(
                "This source is already ingested (done) and cannot be retried.",
            ));
        }
        SourceStatus::Processing => {
            return Err(ApiError::bad_request(
                "Retry is only allowed when status is queued or failed.",
            ));
        }
        SourceStatus::Queued | SourceStatus::Failed => {}
    }
    if source.retry_count >= MAX_INGEST_RETRIES {
        return Err(ApiError::bad_request(format!(
            "Retry limit reached ({MAX_INGEST_RETRIES})."
        )));
    }

    state.database.reset_source_for_retry(source_id).await?;
    state.queue.ingest_source(source_id);
    Ok(Json(ApiResponse::success(OkReply::yes())))
}

/// DELETE /api/knowledge/sources/:id
pub async fn delete_source(
    State(state): State<AppState>,
    Path(source_id): Path<i64>,
) -> ApiResult<OkReply> {
    info!("DELETE /api/knowledge/sources/{}", source_id);

    let deleted = state.database.delete_source(source_id).await?;
    if !deleted {
        return Err(ApiError {
            status: StatusCode::NOT_FOUND,
            message: "Knowledge source not found".to_string(),
        });
    }
    Ok(Json(ApiResponse::success(OkReply::yes())))
}
