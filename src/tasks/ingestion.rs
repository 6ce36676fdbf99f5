//! Knowledge source ingestion
//!
//! Submission registers the source and its raw chunk texts in one
//! transaction; the background worker embeds them in batches. Text
//! extraction and chunking happen upstream of this crate, so a source
//! arrives here as a list of chunk strings.

use std::time::Duration;

use pgvector::Vector;
use sha2::Digest;
use sha2::Sha256;
use tracing::info;
use tracing::warn;

use crate::config::IngestionConfig;
use crate::database::Database;
use crate::embeddings::EmbeddingGateway;
use crate::errors::LexRagError;
use crate::errors::Result;
use crate::models::KnowledgeSource;
use crate::models::NewSource;
use crate::models::SourceStatus;

use super::TaskQueue;

/// Chunks shorter than this after trimming carry no usable signal
const MIN_CHUNK_CHARS: usize = 5;

const EMBED_ATTEMPTS: u32 = 3;

/// Hard cap on retries per source, manual retries included
pub const MAX_INGEST_RETRIES: i32 = 10;

/// sha256 over the chunk texts, hex encoded
///
/// A zero byte separates chunks so that re-splitting the same text at
/// different boundaries yields a different hash.
pub fn content_hash(chunk_texts: &[String]) -> String {
    let mut hasher = Sha256::new();
    for text in chunk_texts {
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Trim chunks and drop the ones too short to embed
pub fn prepare_chunks(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|text| text.trim())
        .filter(|text| text.chars().count() >= MIN_CHUNK_CHARS)
        .map(str::to_string)
        .collect()
}

/// Register a new source and queue it for embedding
///
/// Duplicate content (same hash) is rejected before anything is written.
pub async fn submit_source(
    database: &Database,
    queue: &TaskQueue,
    mut source: NewSource,
) -> Result<KnowledgeSource> {
    source.title = source.title.trim().to_string();
    if source.title.is_empty() {
        return Err(LexRagError::InvalidInput("title required".to_string()));
    }
    source.language = source.language.trim().to_lowercase();
    if source.language.is_empty() {
        source.language = "en".to_string();
    }

    source.chunk_texts = prepare_chunks(&source.chunk_texts);
    if source.chunk_texts.is_empty() {
        return Err(LexRagError::InvalidInput(
            "Source is empty. Please submit a non-empty document.".to_string(),
        ));
    }

    let hash = content_hash(&source.chunk_texts);
    if database.find_source_by_hash(&hash).await?.is_some() {
        return Err(LexRagError::InvalidInput(
            "A document with the same content has already been uploaded.".to_string(),
        ));
    }

    let source_id = database.insert_source_with_chunks(&source, &hash).await?;
    queue.ingest_source(source_id);

    database
        .get_source(source_id)
        .await?
        .ok_or_else(|| LexRagError::NotFound(format!("Knowledge source {source_id} not found")))
}

/// Embed every pending chunk of a source; runs on the task worker
///
/// Terminal states: `done` when all chunks are embedded, `invalid` when the
/// source has no chunks at all, `failed` (retryable) when the provider gave
/// up after backoff.
pub async fn ingest_source(
    database: &Database,
    gateway: &EmbeddingGateway,
    config: &IngestionConfig,
    source_id: i64,
) -> Result<()> {
    if database.get_source(source_id).await?.is_none() {
        warn!("Ingestion skipped, source {} no longer exists", source_id);
        return Ok(());
    }
    database.mark_source_processing(source_id).await?;

    let pending = database.unembedded_chunks(source_id).await?;
    if pending.is_empty() {
        if database.chunk_count(source_id).await? == 0 {
            database
                .set_source_status(
                    source_id,
                    SourceStatus::Invalid,
                    Some("Source produced no text chunks."),
                )
                .await?;
        } else {
            // A previous run embedded everything before it could finish up
            database
                .set_source_status(source_id, SourceStatus::Done, None)
                .await?;
        }
        return Ok(());
    }

    info!(
        "Ingesting source {}: {} chunks to embed",
        source_id,
        pending.len()
    );
    match embed_pending(database, gateway, config, &pending).await {
        Ok(()) => {
            database
                .set_source_status(source_id, SourceStatus::Done, None)
                .await?;
            info!("Source {} ingested", source_id);
            Ok(())
        }
        Err(e) => {
            database
                .set_source_status(source_id, SourceStatus::Failed, Some(&e.to_string()))
                .await?;
            Err(e)
        }
    }
}

async fn embed_pending(
    database: &Database,
    gateway: &EmbeddingGateway,
    config: &IngestionConfig,
    pending: &[(i64, String)],
) -> Result<()> {
    for batch in pending.chunks(config.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        let vectors = embed_with_retry(gateway, &texts).await?;

        let rows: Vec<(i64, Vector)> = batch
            .iter()
            .map(|(chunk_id, _)| *chunk_id)
            .zip(vectors.into_iter().map(Vector::from))
            .collect();
        database.set_chunk_embeddings(&rows).await?;
    }
    Ok(())
}

/// Up to three attempts with exponential backoff, capped at 20s per wait.
/// A dimension mismatch is configuration drift and never retried.
async fn embed_with_retry(
    gateway: &EmbeddingGateway,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match gateway.embed_batch(texts).await {
            Ok((vectors, _)) => return Ok(vectors),
            Err(e @ LexRagError::DimensionMismatch { .. }) => return Err(e),
            Err(e) if attempt < EMBED_ATTEMPTS => {
                let delay = Duration::from_secs(2u64.pow(attempt).min(20));
                warn!(
                    "Embedding batch attempt {} failed ({}), retrying in {:?}",
                    attempt, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_boundary_sensitive() {
        let a = vec!["hello".to_string(), "world".to_string()];
        let b = vec!["hello".to_string(), "world".to_string()];
        let joined = vec!["helloworld".to_string()];
        let shifted = vec!["hellow".to_string(), "orld".to_string()];

        assert_eq!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash(&joined));
        assert_ne!(content_hash(&a), content_hash(&shifted));
        assert_eq!(content_hash(&a).len(), 64);
    }

    #[test]
    fn prepare_drops_blank_and_tiny_chunks() {
        let raw = vec![
            "  A proper legal paragraph about inheritance.  ".to_string(),
            "   ".to_string(),
            "ok".to_string(),
            String::new(),
            "Dowry".to_string(),
        ];
        let cleaned = prepare_chunks(&raw);
        assert_eq!(
            cleaned,
            vec![
                "A proper legal paragraph about inheritance.".to_string(),
                "Dowry".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn retry_backoff_gives_up_after_three_attempts() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::atomic::Ordering;
        use std::sync::Arc;

        use async_trait::async_trait;

        use crate::config::EmbeddingsConfig;
        use crate::providers::EmbeddingApi;

        struct AlwaysFails {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl EmbeddingApi for AlwaysFails {
            async fn embed_batch(
                &self,
                _texts: &[String],
                _timeout: Duration,
            ) -> Result<Vec<Vec<f32>>> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Err(LexRagError::HttpError("connection refused".to_string()))
            }
        }

        // Paused clock skips straight through the 2s and 4s backoff sleeps
        tokio::time::pause();

        let api = Arc::new(AlwaysFails {
            calls: AtomicUsize::new(0),
        });
        let gateway = EmbeddingGateway::new(api.clone(), &EmbeddingsConfig::default());
        let texts = vec!["some chunk".to_string()];

        let err = embed_with_retry(&gateway, &texts).await.unwrap_err();

        assert!(matches!(err, LexRagError::HttpError(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_not_retried() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::atomic::Ordering;
        use std::sync::Arc;

        use async_trait::async_trait;

        use crate::config::EmbeddingsConfig;
        use crate::providers::EmbeddingApi;

        struct WrongWidth {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl EmbeddingApi for WrongWidth {
            async fn embed_batch(
                &self,
                texts: &[String],
                _timeout: Duration,
            ) -> Result<Vec<Vec<f32>>> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(texts.iter().map(|_| vec![0.0_f32; 4]).collect())
            }
        }

        let api = Arc::new(WrongWidth {
            calls: AtomicUsize::new(0),
        });
        let config = EmbeddingsConfig {
            dimension: 8,
            ..EmbeddingsConfig::default()
        };
        let gateway = EmbeddingGateway::new(api.clone(), &config);

        let err = embed_with_retry(&gateway, &["text".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LexRagError::DimensionMismatch {
                expected: 8,
                actual: 4
            }
        ));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }
}
