//! Retrieval-augmented answering for legal questions
//!
//! The pipeline classifies each question, retrieves the closest knowledge
//! chunks in the user's language, gates the answer on a calibrated distance
//! threshold, and composes the final reply from retrieved context only.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use lexrag::config::AppConfig;
//! use lexrag::database::Database;
//! use lexrag::embeddings::EmbeddingGateway;
//! use lexrag::providers;
//! use lexrag::rag::AskRequest;
//! use lexrag::rag::AskService;
//! use lexrag::tasks;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let database = Arc::new(Database::from_config(&config).await?);
//!     let gateway = Arc::new(EmbeddingGateway::from_config(&config.embeddings)?);
//!     let chat = providers::chat_api_from_config(&config.chat)?;
//!     let (queue, _worker) = tasks::spawn_worker(
//!         database.as_ref().clone(),
//!         gateway.clone(),
//!         config.ingestion.clone(),
//!     );
//!
//!     let service = AskService::new(database, gateway, chat, queue, &config);
//!     let response = service
//!         .ask(&AskRequest {
//!             question: "What is khula?".to_string(),
//!             user_id: 1,
//!             language: "en".to_string(),
//!             conversation_id: None,
//!             safe_mode: false,
//!         })
//!         .await?;
//!     println!("{}: {}", response.decision.as_str(), response.answer);
//!
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod composer;
pub mod retriever;
pub mod router;
pub mod threshold;

pub use classifier::QueryClassifier;
pub use composer::AnswerComposer;
pub use composer::HistoryTurn;
pub use retriever::Retrieval;
pub use retriever::Retriever;
pub use router::AskRequest;
pub use router::AskResponse;
pub use router::AskService;
pub use threshold::ThresholdCalibrator;
