//! API route definitions

use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use axum::Router;

use super::handlers;
use super::handlers::AppState;

/// Create RESTful API router
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Chat endpoints
        .route("/chat/ask", post(handlers::ask))
        .route("/chat/conversations", get(handlers::list_conversations))
        .route(
            "/chat/conversations/:id",
            put(handlers::rename_conversation).delete(handlers::delete_conversation),
        )
        .route(
            "/chat/conversations/:id/messages",
            get(handlers::conversation_messages),
        )
        // Knowledge administration
        .route(
            "/knowledge/sources",
            post(handlers::submit_source).get(handlers::list_sources),
        )
        .route("/knowledge/sources/:id", delete(handlers::delete_source))
        .route("/knowledge/sources/:id/retry", post(handlers::retry_source))
        // Evaluation metrics
        .route("/metrics/summary", get(handlers::metrics_summary))
        .with_state(state)
}
