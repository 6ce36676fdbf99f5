//! HTTP server implementation

use std::sync::Arc;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::AppState;
use crate::api::routes;
use crate::config::AppConfig;
use crate::database::Database;
use crate::embeddings::EmbeddingGateway;
use crate::providers;
use crate::rag::AskService;
use crate::tasks;
use crate::Result;

/// Start the API server
pub async fn serve_api(
    config: &AppConfig,
    host: String,
    port: u16,
    enable_cors: bool,
) -> Result<()> {
    info!("🚀 Starting LexRAG API server...");

    // Initialize services
    let database = Arc::new(Database::from_config(config).await?);
    database.verify_schema_or_error().await?;

    let gateway = Arc::new(EmbeddingGateway::from_config(&config.embeddings)?);
    let chat = providers::chat_api_from_config(&config.chat)?;

    // Background ingestion and evaluation logging
    let (queue, _worker) = tasks::spawn_worker(
        database.as_ref().clone(),
        gateway.clone(),
        config.ingestion.clone(),
    );
    let _watchdog = tasks::spawn_watchdog(
        database.as_ref().clone(),
        queue.clone(),
        config.ingestion.clone(),
    );

    let ask_service = Arc::new(AskService::new(
        database.clone(),
        gateway,
        chat,
        queue.clone(),
        config,
    ));

    let state = AppState {
        database,
        ask_service,
        queue,
    };

    // Build API routes
    let mut app = Router::new().nest("/api", routes::api_routes(state));

    // Add middleware layers
    app = app
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    // Add CORS if enabled
    if enable_cors {
        info!("✅ CORS enabled");
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    // Start server
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🌐 API server listening on http://{}", addr);
    info!("📋 RESTful API available at http://{}/api", addr);
    info!("");
    info!("Available endpoints:");
    info!("  GET    /api/health                          - Health check");
    info!("  POST   /api/chat/ask                        - Ask a legal question");
    info!("  GET    /api/chat/conversations              - List conversations");
    info!("  GET    /api/chat/conversations/:id/messages - Conversation history");
    info!("  PUT    /api/chat/conversations/:id          - Rename conversation");
    info!("  DELETE /api/chat/conversations/:id          - Delete conversation");
    info!("  POST   /api/knowledge/sources               - Submit knowledge source");
    info!("  GET    /api/knowledge/sources               - List knowledge sources");
    info!("  POST   /api/knowledge/sources/:id/retry     - Retry failed ingestion");
    info!("  DELETE /api/knowledge/sources/:id           - Delete knowledge source");
    info!("  GET    /api/metrics/summary                 - Evaluation metrics");

    axum::serve(listener, app).await?;

    Ok(())
}
