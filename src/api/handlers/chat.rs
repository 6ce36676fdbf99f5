//! Chat handlers: ask plus conversation management

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use tracing::info;

use super::require_user_id;
use super::safe_mode_on;
use super::ApiError;
use super::ApiResult;
use super::AppState;
use crate::api::types::ApiResponse;
use crate::api::types::AskBody;
use crate::api::types::AskReply;
use crate::api::types::ConversationItem;
use crate::api::types::ConversationPage;
use crate::api::types::MessagePage;
use crate::api::types::OkReply;
use crate::api::types::PageQuery;
use crate::api::types::RenameBody;
use crate::rag::AskRequest;

/// POST /api/chat/ask
pub async fn ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AskBody>,
) -> ApiResult<AskReply> {
    let user_id = require_user_id(&headers)?;
    let safe_mode = safe_mode_on(&headers);
    info!("POST /api/chat/ask user_id={} safe_mode={}", user_id, safe_mode);

    let request = AskRequest {
        question: body.question,
        user_id,
        language: body.language.unwrap_or_else(|| "en".to_string()),
        conversation_id: body.conversation_id,
        safe_mode,
    };
    let response = state.ask_service.ask(&request).await?;

    Ok(Json(ApiResponse::success(AskReply {
        answer: response.answer,
        conversation_id: response.conversation_id,
        contexts_used: response.contexts_used,
    })))
}

/// GET /api/chat/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> ApiResult<ConversationPage> {
    let user_id = require_user_id(&headers)?;
    let (page, limit) = query.clamp(20, 100);
    info!("GET /api/chat/conversations user_id={} page={}", user_id, page);

    let conversations = state
        .database
        .list_conversations(user_id, limit, (page - 1) * limit)
        .await?;

    Ok(Json(ApiResponse::success(ConversationPage {
        page,
        limit,
        items: conversations.into_iter().map(ConversationItem::from).collect(),
    })))
}

/// GET /api/chat/conversations/:id/messages
pub async fn conversation_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<MessagePage> {
    let user_id = require_user_id(&headers)?;
    let (page, limit) = query.clamp(30, 100);
    info!(
        "GET /api/chat/conversations/{}/messages user_id={}",
        conversation_id, user_id
    );

    let conversation = state
        .database
        .get_owned_conversation(conversation_id, user_id)
        .await?;
    let messages = state
        .database
        .list_messages(conversation_id, user_id, limit, (page - 1) * limit)
        .await?;

    Ok(Json(ApiResponse::success(MessagePage {
        conversation_id,
        title: conversation.title,
        page,
        limit,
        items: messages.into_iter().map(Into::into).collect(),
    })))
}

/// PUT /api/chat/conversations/:id
pub async fn rename_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<i64>,
    Json(body): Json<RenameBody>,
) -> ApiResult<OkReply> {
    let user_id = require_user_id(&headers)?;
    info!(
        "PUT /api/chat/conversations/{} user_id={}",
        conversation_id, user_id
    );

    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("title required"));
    }
    if title.chars().count() > 200 {
        return Err(ApiError::bad_request("title too long (max 200 chars)"));
    }

    state
        .database
        .rename_conversation(conversation_id, user_id, title)
        .await?;
    Ok(Json(ApiResponse::success(OkReply::yes())))
}

/// DELETE /api/chat/conversations/:id
pub async fn delete_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<i64>,
) -> ApiResult<OkReply> {
    let user_id = require_user_id(&headers)?;
    info!(
        "DELETE /api/chat/conversations/{} user_id={}",
        conversation_id, user_id
    );

    state
        .database
        .delete_conversation(conversation_id, user_id)
        .await?;
    Ok(Json(ApiResponse::success(OkReply::yes())))
}
