use super::Database;
use crate::LexRagError;
use crate::Result;

impl Database {
    /// Check if database schema is initialized
    /// Returns true if all required tables exist
    pub async fn is_schema_initialized(&self) -> Result<bool> {
        let required_tables = vec![
            "knowledge_sources",
            "knowledge_chunks",
            "chat_conversations",
            "chat_messages",
            "rag_evaluation_logs",
        ];

        for table_name in required_tables {
            let result = sqlx::query_scalar::<_, bool>(
                r"
                SELECT EXISTS (
                    SELECT FROM information_schema.tables
                    WHERE table_schema = 'public'
                    AND table_name = $1
                )
                ",
            )
            .bind(table_name)
            .fetch_one(&self.pool)
            .await?;

            if !result {
                tracing::debug!("Missing required table: {}", table_name);
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Verify database schema or return helpful error
    pub async fn verify_schema_or_error(&self) -> Result<()> {
        if !self.is_schema_initialized().await? {
            return Err(LexRagError::Custom(
                "Database schema not initialized. Run `lexrag init` first.".to_string(),
            ));
        }
        Ok(())
    }

    /// Initialize database schema
    ///
    /// Vector columns are sized to the configured embedding dimension; changing
    /// the dimension later requires re-creating `knowledge_chunks`.
    pub async fn init_schema(&self, embedding_dimension: usize) -> Result<()> {
        // Needs superuser on some installs; harmless if already present
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .ok();

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS knowledge_sources (
                id BIGSERIAL PRIMARY KEY,
                title VARCHAR(255) NOT NULL,
                source_type VARCHAR(20) NOT NULL,
                locator TEXT NOT NULL,
                language VARCHAR(8) NOT NULL DEFAULT 'en',
                content_hash CHAR(64) UNIQUE,
                status VARCHAR(20) NOT NULL DEFAULT 'queued',
                error_message TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r"
            CREATE TABLE IF NOT EXISTS knowledge_chunks (
                id BIGSERIAL PRIMARY KEY,
                source_id BIGINT NOT NULL REFERENCES knowledge_sources(id) ON DELETE CASCADE,
                chunk_text TEXT NOT NULL,
                embedding VECTOR({embedding_dimension}),
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            ",
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chat_conversations (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL,
                title VARCHAR(200) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id BIGSERIAL PRIMARY KEY,
                conversation_id BIGINT NOT NULL REFERENCES chat_conversations(id) ON DELETE CASCADE,
                user_id BIGINT NOT NULL,
                role VARCHAR(16) NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS rag_evaluation_logs (
                id BIGSERIAL PRIMARY KEY,
                question TEXT NOT NULL,
                question_length INTEGER NOT NULL,
                answer TEXT NOT NULL,
                answer_length INTEGER NOT NULL,
                decision VARCHAR(20) NOT NULL,
                category VARCHAR(40) NOT NULL,
                in_domain BOOLEAN NOT NULL,
                safe_mode BOOLEAN NOT NULL DEFAULT FALSE,
                language VARCHAR(8) NOT NULL,
                best_distance DOUBLE PRECISION,
                threshold DOUBLE PRECISION,
                contexts_used INTEGER NOT NULL DEFAULT 0,
                embedding_time_ms INTEGER,
                llm_time_ms INTEGER,
                total_time_ms INTEGER NOT NULL,
                total_tokens INTEGER,
                embedding_model VARCHAR(100) NOT NULL,
                chat_model VARCHAR(100) NOT NULL,
                error_occurred BOOLEAN NOT NULL DEFAULT FALSE,
                error_message TEXT,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        self.create_indexes().await?;

        Ok(())
    }

    async fn create_indexes(&self) -> Result<()> {
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_source ON knowledge_chunks(source_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_conversation \
             ON chat_messages(conversation_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_conversations_user \
             ON chat_conversations(user_id, updated_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_rag_evaluation_logs_created \
             ON rag_evaluation_logs(created_at)",
        )
        .execute(&self.pool)
        .await?;

        // Approximate index; exact scans still work without it, so ignore failures
        // (e.g. ivfflat unavailable on managed Postgres without pgvector >= 0.5)
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_embedding \
             ON knowledge_chunks USING ivfflat (embedding vector_l2_ops) WITH (lists = 100)",
        )
        .execute(&self.pool)
        .await
        .ok();

        tracing::debug!("Essential indexes ensured");
        Ok(())
    }
}
