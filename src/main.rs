use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use lexrag::config::AppConfig;
use lexrag::database::Database;
use lexrag::embeddings::EmbeddingGateway;
use lexrag::models::NewSource;
use lexrag::providers;
use lexrag::rag::AskRequest;
use lexrag::rag::AskService;
use lexrag::rag::ThresholdCalibrator;
use lexrag::tasks;
use lexrag::tasks::ingestion;
use lexrag::LexRagError;
use lexrag::Result;
use tracing::info;

#[derive(Parser)]
#[command(name = "lexrag")]
#[command(about = "Legal-awareness RAG backend: API server and admin tools")]
#[command(version)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Bind host (defaults to the configured server host)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (defaults to the configured server port)
        #[arg(long)]
        port: Option<u16>,
        /// Disable CORS even if the config enables it
        #[arg(long)]
        no_cors: bool,
    },
    /// Initialize database schema and indexes
    Init,
    /// Submit a text file as a knowledge source and embed it
    Ingest {
        /// Path to a UTF-8 text file; blank lines separate chunks
        file: PathBuf,
        /// Source title
        #[arg(short, long)]
        title: String,
        /// Source language ("en" or "ur")
        #[arg(short, long, default_value = "en")]
        language: String,
    },
    /// Ask a question from the terminal
    Ask {
        /// The question text
        question: String,
        /// Answer language ("en" or "ur")
        #[arg(short, long, default_value = "en")]
        language: String,
        /// Acting user id
        #[arg(short, long, default_value = "1")]
        user: i64,
        /// Safe mode: no conversation is stored
        #[arg(long)]
        safe: bool,
    },
    /// Compute and print the similarity distance threshold
    Calibrate,
    /// List knowledge sources and their ingestion status
    Sources {
        /// Maximum number of sources to list
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        lexrag::logging::init_logging_with_level("debug")?;
    } else {
        lexrag::logging::init_logging()?;
    }

    // Load configuration
    let config = AppConfig::load()?;
    info!("Configuration loaded successfully");

    // Execute the requested command
    match cli.command {
        Commands::Serve {
            host,
            port,
            no_cors,
        } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let cors = config.server.enable_cors && !no_cors;
            lexrag::api::serve_api(&config, host, port, cors).await?;
        }
        Commands::Init => {
            handle_init(&config).await?;
        }
        Commands::Ingest {
            file,
            title,
            language,
        } => {
            handle_ingest(&config, &file, title, language).await?;
        }
        Commands::Ask {
            question,
            language,
            user,
            safe,
        } => {
            handle_ask(&config, question, language, user, safe).await?;
        }
        Commands::Calibrate => {
            handle_calibrate(&config).await?;
        }
        Commands::Sources { limit } => {
            handle_sources(&config, limit).await?;
        }
    }

    Ok(())
}

async fn handle_init(config: &AppConfig) -> Result<()> {
    let database = Database::from_config(config).await?;
    database.init_schema(config.embeddings.dimension).await?;
    println!(
        "✅ Schema initialized (embedding dimension {})",
        config.embeddings.dimension
    );
    Ok(())
}

async fn handle_ingest(
    config: &AppConfig,
    file: &Path,
    title: String,
    language: String,
) -> Result<()> {
    let text = std::fs::read_to_string(file)?;
    let chunks: Vec<String> = text.split("\n\n").map(str::to_string).collect();

    let database = Database::from_config(config).await?;
    database.verify_schema_or_error().await?;
    let gateway = Arc::new(EmbeddingGateway::from_config(&config.embeddings)?);
    let (queue, worker) =
        tasks::spawn_worker(database.clone(), gateway, config.ingestion.clone());

    let source_type = file
        .extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or("txt")
        .to_string();
    let source = ingestion::submit_source(
        &database,
        &queue,
        NewSource {
            title,
            source_type,
            locator: file.display().to_string(),
            language,
            chunk_texts: chunks,
        },
    )
    .await?;

    println!("📄 Source {} registered, embedding...", source.id);
    queue.shutdown();
    worker
        .await
        .map_err(|e| LexRagError::Custom(format!("Ingestion worker failed: {e}")))?;

    match database.get_source(source.id).await? {
        Some(refreshed) => match refreshed.status.as_str() {
            "done" => {
                let chunk_count = database.chunk_count(source.id).await?;
                println!("✅ Source {} ingested ({} chunks)", source.id, chunk_count);
            }
            status => {
                println!(
                    "❌ Source {} ended in status '{}': {}",
                    source.id,
                    status,
                    refreshed.error_message.as_deref().unwrap_or("no detail")
                );
            }
        },
        None => println!("❌ Source {} disappeared during ingestion", source.id),
    }
    Ok(())
}

async fn handle_ask(
    config: &AppConfig,
    question: String,
    language: String,
    user: i64,
    safe: bool,
) -> Result<()> {
    let database = Arc::new(Database::from_config(config).await?);
    database.verify_schema_or_error().await?;
    let gateway = Arc::new(EmbeddingGateway::from_config(&config.embeddings)?);
    let chat = providers::chat_api_from_config(&config.chat)?;
    let (queue, worker) = tasks::spawn_worker(
        database.as_ref().clone(),
        gateway.clone(),
        config.ingestion.clone(),
    );

    let service = AskService::new(database, gateway, chat, queue.clone(), config);
    let response = service
        .ask(&AskRequest {
            question,
            user_id: user,
            language,
            conversation_id: None,
            safe_mode: safe,
        })
        .await?;

    println!("\n{}\n", response.answer);
    println!("Decision:      {}", response.decision.as_str());
    println!("Contexts used: {}", response.contexts_used);
    if let Some(conversation_id) = response.conversation_id {
        println!("Conversation:  {conversation_id}");
    }

    // Let the evaluation record flush before exit
    queue.shutdown();
    let _ = worker.await;
    Ok(())
}

async fn handle_calibrate(config: &AppConfig) -> Result<()> {
    let database = Database::from_config(config).await?;
    database.verify_schema_or_error().await?;

    if let Some(manual) = config.rag.distance_threshold {
        println!("Manual threshold override configured: {manual}");
    }
    let calibrator = ThresholdCalibrator::new(config.rag.clone());
    let threshold = calibrator.threshold(&database).await;
    println!("📏 Distance threshold: {threshold:.4}");
    Ok(())
}

async fn handle_sources(config: &AppConfig, limit: i64) -> Result<()> {
    let database = Database::from_config(config).await?;
    database.verify_schema_or_error().await?;

    let total = database.count_sources().await?;
    let sources = database.list_sources(limit.max(1), 0).await?;

    println!("Found {} sources (showing {}):", total, sources.len());
    for source in sources {
        println!(
            "  - [{}] {} | {} | lang={} | retries={}{}",
            source.id,
            source.title,
            source.status,
            source.language,
            source.retry_count,
            source
                .error_message
                .as_deref()
                .map(|message| format!(" | error: {message}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}
