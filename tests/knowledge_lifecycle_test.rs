//! Ingestion lifecycle through the public API: submit, embed via the
//! background worker, retry reset, delete.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lexrag::database::Database;
use lexrag::embeddings::EmbeddingGateway;
use lexrag::models::NewSource;
use lexrag::models::SourceStatus;
use lexrag::providers::EmbeddingApi;
use lexrag::tasks::ingestion::submit_source;
use lexrag::tasks::spawn_worker;
use lexrag::AppConfig;
use lexrag::LexRagError;
use lexrag::Result;
use pgvector::Vector;

const TITLE: &str = "Lifecycle probe document";

/// Embedding backend that returns the same vector for every input
struct StaticEmbed {
    dimension: usize,
}

#[async_trait]
impl EmbeddingApi for StaticEmbed {
    async fn embed_batch(&self, texts: &[String], _timeout: Duration) -> Result<Vec<Vec<f32>>> {
        Ok(vec![vec![0.25; self.dimension]; texts.len()])
    }
}

#[tokio::test]
#[ignore = "Requires database access - production database should not be modified"]
async fn source_lifecycle_from_submission_to_deletion() -> Result<()> {
    let config = AppConfig::load()?;
    let database = Database::from_config(&config).await?;
    sqlx::query("DELETE FROM knowledge_sources WHERE title = $1")
        .bind(TITLE)
        .execute(database.pool())
        .await?;

    let gateway = Arc::new(EmbeddingGateway::new(
        Arc::new(StaticEmbed {
            dimension: config.embeddings.dimension,
        }),
        &config.embeddings,
    ));
    let (queue, worker) = spawn_worker(database.clone(), gateway, config.ingestion.clone());

    let chunks = vec![
        "The family court hears khula suits under the Family Courts Act 1964.".to_string(),
        "ok".to_string(),
        "A dower amount recorded in the nikah nama is recoverable as a debt.".to_string(),
    ];
    let source = submit_source(
        &database,
        &queue,
        NewSource {
            title: TITLE.to_string(),
            source_type: "txt".to_string(),
            locator: "inline".to_string(),
            language: "en".to_string(),
            chunk_texts: chunks.clone(),
        },
    )
    .await?;
    assert_eq!(source.status, SourceStatus::Queued.as_str());

    // Same content under another title is rejected before anything is written
    let duplicate = submit_source(
        &database,
        &queue,
        NewSource {
            title: "Different title, same content".to_string(),
            source_type: "txt".to_string(),
            locator: "inline".to_string(),
            language: "en".to_string(),
            chunk_texts: chunks,
        },
    )
    .await;
    assert!(matches!(duplicate, Err(LexRagError::InvalidInput(_))));

    queue.shutdown();
    worker.await.expect("worker exits cleanly");

    let ingested = database
        .get_source(source.id)
        .await?
        .expect("source still present");
    assert_eq!(ingested.status, SourceStatus::Done.as_str());
    assert_eq!(ingested.error_message, None);
    // The two-character chunk was dropped at submission
    assert_eq!(database.chunk_count(source.id).await?, 2);

    let query = Vector::from(vec![0.25; config.embeddings.dimension]);
    let hits = database.search_chunks(&query, 5, Some("en")).await?;
    assert!(hits
        .iter()
        .any(|hit| hit.chunk_text.starts_with("The family court")));
    assert!(hits[0].distance < 1e-6);

    assert!(database.reset_source_for_retry(source.id).await?);
    let queued = database
        .get_source(source.id)
        .await?
        .expect("source still present");
    assert_eq!(queued.status, SourceStatus::Queued.as_str());

    assert!(database.delete_source(source.id).await?);
    assert!(database.get_source(source.id).await?.is_none());
    Ok(())
}
