use pgvector::Vector;

use super::Database;
use crate::models::ChunkHit;
use crate::models::KnowledgeSource;
use crate::models::NewSource;
use crate::models::SourceStatus;
use crate::Result;

impl Database {
    /// Insert a source and its chunk texts (embeddings NULL) in one transaction
    ///
    /// Returns the new source id. Chunks stay invisible to search until the
    /// ingestion worker embeds them.
    pub async fn insert_source_with_chunks(
        &self,
        source: &NewSource,
        content_hash: &str,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let source_id = sqlx::query_scalar::<_, i64>(
            r"
            INSERT INTO knowledge_sources (title, source_type, locator, language, content_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(&source.title)
        .bind(&source.source_type)
        .bind(&source.locator)
        .bind(&source.language)
        .bind(content_hash)
        .fetch_one(&mut *tx)
        .await?;

        for chunk_text in &source.chunk_texts {
            sqlx::query("INSERT INTO knowledge_chunks (source_id, chunk_text) VALUES ($1, $2)")
                .bind(source_id)
                .bind(chunk_text)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Registered source {} ({} chunks, language={})",
            source_id,
            source.chunk_texts.len(),
            source.language
        );

        Ok(source_id)
    }

    pub async fn find_source_by_hash(&self, content_hash: &str) -> Result<Option<KnowledgeSource>> {
        let source = sqlx::query_as::<_, KnowledgeSource>(
            "SELECT * FROM knowledge_sources WHERE content_hash = $1",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(source)
    }

    pub async fn get_source(&self, source_id: i64) -> Result<Option<KnowledgeSource>> {
        let source =
            sqlx::query_as::<_, KnowledgeSource>("SELECT * FROM knowledge_sources WHERE id = $1")
                .bind(source_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(source)
    }

    pub async fn list_sources(&self, limit: i64, offset: i64) -> Result<Vec<KnowledgeSource>> {
        let sources = sqlx::query_as::<_, KnowledgeSource>(
            "SELECT * FROM knowledge_sources ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    pub async fn count_sources(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM knowledge_sources")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Delete a source; chunks go with it via ON DELETE CASCADE
    pub async fn delete_source(&self, source_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM knowledge_sources WHERE id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a source to `processing` and charge one retry attempt
    pub async fn mark_source_processing(&self, source_id: i64) -> Result<()> {
        sqlx::query(
            r"
            UPDATE knowledge_sources
            SET status = 'processing', retry_count = retry_count + 1, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Set a terminal status; `done` clears any previous error message
    pub async fn set_source_status(
        &self,
        source_id: i64,
        status: SourceStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE knowledge_sources
            SET status = $2, error_message = $3, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(source_id)
        .bind(status.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Re-queue a source for manual retry; returns false when it does not exist
    pub async fn reset_source_for_retry(&self, source_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE knowledge_sources
            SET status = 'queued', error_message = NULL, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sources the watchdog should re-enqueue: stuck in `queued` or `failed`
    /// under the retry budget and untouched for the given number of hours
    pub async fn stalled_sources(&self, hours: i64, max_retries: i32) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r"
            SELECT id FROM knowledge_sources
            WHERE status IN ('queued', 'failed')
              AND retry_count < $2
              AND updated_at < NOW() - make_interval(hours => $1::int)
            ORDER BY updated_at ASC
            ",
        )
        .bind(hours)
        .bind(max_retries)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Chunks of a source still waiting for an embedding, oldest first
    pub async fn unembedded_chunks(&self, source_id: i64) -> Result<Vec<(i64, String)>> {
        let chunks = sqlx::query_as::<_, (i64, String)>(
            r"
            SELECT id, chunk_text FROM knowledge_chunks
            WHERE source_id = $1 AND embedding IS NULL
            ORDER BY id
            ",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    pub async fn chunk_count(&self, source_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM knowledge_chunks WHERE source_id = $1",
        )
        .bind(source_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn embedded_chunk_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM knowledge_chunks WHERE embedding IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Write embeddings for a batch of chunks in one transaction
    pub async fn set_chunk_embeddings(&self, embeddings: &[(i64, Vector)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (chunk_id, embedding) in embeddings {
            sqlx::query("UPDATE knowledge_chunks SET embedding = $2 WHERE id = $1")
                .bind(chunk_id)
                .bind(embedding)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Nearest chunks by L2 distance, optionally partitioned by source language
    ///
    /// Chunks without an embedding never match. An empty result is a valid
    /// outcome, not an error.
    pub async fn search_chunks(
        &self,
        embedding: &Vector,
        top_k: usize,
        language: Option<&str>,
    ) -> Result<Vec<ChunkHit>> {
        let hits = sqlx::query_as::<_, ChunkHit>(
            r"
            SELECT c.id AS chunk_id,
                   c.chunk_text,
                   (c.embedding <-> $1)::float8 AS distance
            FROM knowledge_chunks c
            JOIN knowledge_sources s ON s.id = c.source_id
            WHERE c.embedding IS NOT NULL
              AND ($3::text IS NULL OR s.language = $3)
            ORDER BY c.embedding <-> $1
            LIMIT $2
            ",
        )
        .bind(embedding)
        .bind(top_k as i64)
        .bind(language)
        .fetch_all(&self.pool)
        .await?;
        Ok(hits)
    }

    /// Nearest-neighbor distances for a random sample of embedded chunks,
    /// excluding each chunk itself
    ///
    /// Input to threshold calibration. Samples with no neighbor (single-chunk
    /// corpus) produce no row.
    pub async fn calibration_sample_distances(&self, sample_size: usize) -> Result<Vec<f64>> {
        let distances = sqlx::query_scalar::<_, f64>(
            r"
            SELECT nn.distance
            FROM (
                SELECT id, embedding
                FROM knowledge_chunks
                WHERE embedding IS NOT NULL
                ORDER BY RANDOM()
                LIMIT $1
            ) sample
            CROSS JOIN LATERAL (
                SELECT (c.embedding <-> sample.embedding)::float8 AS distance
                FROM knowledge_chunks c
                WHERE c.embedding IS NOT NULL AND c.id <> sample.id
                ORDER BY c.embedding <-> sample.embedding
                LIMIT 1
            ) nn
            ",
        )
        .bind(sample_size as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(distances)
    }
}
