//! Embedding gateway: input checks, batch splitting, dimension validation
//! and timing on top of the provider capability

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;

use crate::config::EmbeddingsConfig;
use crate::errors::LexRagError;
use crate::errors::Result;
use crate::providers::EmbeddingApi;

/// Shared gateway in front of the configured embedding backend
///
/// Every vector leaving this type has the configured dimension; a mismatch is
/// a hard error, never silently truncated.
pub struct EmbeddingGateway {
    api: Arc<dyn EmbeddingApi>,
    model: String,
    dimension: usize,
    max_batch_size: usize,
    request_timeout: Duration,
    batch_timeout: Duration,
}

impl EmbeddingGateway {
    /// Build the gateway over an already-constructed backend (tests inject
    /// mocks here)
    pub fn new(api: Arc<dyn EmbeddingApi>, config: &EmbeddingsConfig) -> Self {
        Self {
            api,
            model: config.model.clone(),
            dimension: config.dimension,
            max_batch_size: config.max_batch_size.max(1),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            batch_timeout: Duration::from_secs(config.batch_timeout_secs),
        }
    }

    /// Build the gateway and its backend from config
    pub fn from_config(config: &EmbeddingsConfig) -> Result<Self> {
        let api = crate::providers::embedding_api_from_config(config)?;
        Ok(Self::new(api, config))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a single text; returns the vector and elapsed milliseconds
    pub async fn embed(&self, text: &str) -> Result<(Vec<f32>, u64)> {
        if text.trim().is_empty() {
            return Err(LexRagError::InvalidInput(
                "Cannot embed empty text".to_string(),
            ));
        }

        let started = Instant::now();
        let input = [text.to_string()];
        let mut vectors = self.api.embed_batch(&input, self.request_timeout).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let vector = vectors.pop().ok_or_else(|| {
            LexRagError::EmbeddingError("Provider returned no embedding".to_string())
        })?;
        self.check_dimension(&vector)?;

        debug!("Embedded 1 text in {}ms", elapsed_ms);
        Ok((vector, elapsed_ms))
    }

    /// Embed many texts preserving input order, splitting oversized batches
    pub async fn embed_batch(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, u64)> {
        if texts.is_empty() {
            return Err(LexRagError::InvalidInput(
                "Cannot embed an empty batch".to_string(),
            ));
        }
        if texts.iter().any(|text| text.trim().is_empty()) {
            return Err(LexRagError::InvalidInput(
                "Batch contains an empty text".to_string(),
            ));
        }

        let started = Instant::now();
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch_size) {
            let vectors = self.api.embed_batch(batch, self.batch_timeout).await?;
            if vectors.len() != batch.len() {
                return Err(LexRagError::EmbeddingError(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            all.extend(vectors);
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;

        for vector in &all {
            self.check_dimension(vector)?;
        }

        debug!("Embedded {} texts in {}ms", texts.len(), elapsed_ms);
        Ok((all, elapsed_ms))
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(LexRagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::*;

    struct FixedEmbedder {
        dimension: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingApi for FixedEmbedder {
        async fn embed_batch(
            &self,
            texts: &[String],
            _timeout: Duration,
        ) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.25; self.dimension]).collect())
        }
    }

    fn test_config(dimension: usize, max_batch_size: usize) -> EmbeddingsConfig {
        EmbeddingsConfig {
            provider: "openai".to_string(),
            model: "text-embedding-3-large".to_string(),
            dimension,
            base_url: None,
            api_key: None,
            request_timeout_secs: 40,
            batch_timeout_secs: 60,
            max_batch_size,
        }
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_call() {
        let api = Arc::new(FixedEmbedder {
            dimension: 8,
            calls: AtomicUsize::new(0),
        });
        let gateway = EmbeddingGateway::new(api.clone(), &test_config(8, 100));

        let err = gateway.embed("   ").await.unwrap_err();
        assert!(matches!(err, LexRagError::InvalidInput(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_fatal() {
        let api = Arc::new(FixedEmbedder {
            dimension: 4,
            calls: AtomicUsize::new(0),
        });
        // Gateway expects 8, backend produces 4
        let gateway = EmbeddingGateway::new(api, &test_config(8, 100));

        let err = gateway.embed("what is bail").await.unwrap_err();
        assert!(matches!(
            err,
            LexRagError::DimensionMismatch {
                expected: 8,
                actual: 4
            }
        ));
    }

    #[tokio::test]
    async fn oversized_batches_are_split() {
        let api = Arc::new(FixedEmbedder {
            dimension: 8,
            calls: AtomicUsize::new(0),
        });
        let gateway = EmbeddingGateway::new(api.clone(), &test_config(8, 10));

        let texts: Vec<String> = (0..25).map(|i| format!("chunk {i}")).collect();
        let (vectors, _elapsed) = gateway.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 25);
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn batch_with_blank_entry_is_rejected() {
        let api = Arc::new(FixedEmbedder {
            dimension: 8,
            calls: AtomicUsize::new(0),
        });
        let gateway = EmbeddingGateway::new(api.clone(), &test_config(8, 100));

        let texts = vec!["fine".to_string(), "\t".to_string()];
        let err = gateway.embed_batch(&texts).await.unwrap_err();
        assert!(matches!(err, LexRagError::InvalidInput(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }
}
