//! Language-scoped retrieval over the knowledge base

use std::sync::Arc;

use pgvector::Vector;
use tracing::debug;

use crate::config::RagConfig;
use crate::database::Database;
use crate::embeddings::EmbeddingGateway;
use crate::errors::Result;
use crate::models::ChunkHit;

/// Result of one retrieval pass
#[derive(Debug, Clone)]
pub struct Retrieval {
    /// Nearest chunks, ascending by distance
    pub hits: Vec<ChunkHit>,
    pub embedding_time_ms: u64,
}

impl Retrieval {
    /// Smallest distance among the hits
    pub fn best_distance(&self) -> Option<f64> {
        self.hits.first().map(|hit| hit.distance)
    }

    /// Chunk texts in retrieval order, ready for prompt assembly
    pub fn contexts(&self) -> Vec<String> {
        self.hits.iter().map(|hit| hit.chunk_text.clone()).collect()
    }
}

/// Embeds a question and finds its nearest stored chunks
pub struct Retriever {
    database: Arc<Database>,
    gateway: Arc<EmbeddingGateway>,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        database: Arc<Database>,
        gateway: Arc<EmbeddingGateway>,
        config: &RagConfig,
    ) -> Self {
        Self {
            database,
            gateway,
            top_k: config.top_k,
        }
    }

    /// Embed `question` and return its top-K neighbors within `language`
    pub async fn retrieve(&self, question: &str, language: &str) -> Result<Retrieval> {
        let (embedding, embedding_time_ms) = self.gateway.embed(question).await?;
        let hits = self
            .database
            .search_chunks(&Vector::from(embedding), self.top_k, Some(language))
            .await?;

        debug!(
            "Retrieved {} chunks lang={} best_distance={:?} embed_ms={}",
            hits.len(),
            language,
            hits.first().map(|hit| hit.distance),
            embedding_time_ms
        );
        Ok(Retrieval {
            hits,
            embedding_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(chunk_id: i64, distance: f64) -> ChunkHit {
        ChunkHit {
            chunk_id,
            chunk_text: format!("chunk {chunk_id}"),
            distance,
        }
    }

    #[test]
    fn best_distance_is_the_first_hit() {
        let retrieval = Retrieval {
            hits: vec![hit(7, 0.31), hit(3, 0.44), hit(9, 1.2)],
            embedding_time_ms: 12,
        };
        assert_eq!(retrieval.best_distance(), Some(0.31));
        assert_eq!(
            retrieval.contexts(),
            vec!["chunk 7", "chunk 3", "chunk 9"]
        );
    }

    #[test]
    fn empty_retrieval_has_no_best_distance() {
        let retrieval = Retrieval {
            hits: Vec::new(),
            embedding_time_ms: 5,
        };
        assert_eq!(retrieval.best_distance(), None);
        assert!(retrieval.contexts().is_empty());
    }
}
