use chrono::Duration;
use chrono::Utc;

use super::Database;
use crate::models::DecisionCount;
use crate::models::EvaluationRecord;
use crate::models::MetricsSummary;
use crate::Result;

impl Database {
    /// Append one evaluation row; called from the background worker only
    pub async fn insert_evaluation(&self, record: &EvaluationRecord) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r"
            INSERT INTO rag_evaluation_logs (
                question, question_length, answer, answer_length,
                decision, category, in_domain, safe_mode, language,
                best_distance, threshold, contexts_used,
                embedding_time_ms, llm_time_ms, total_time_ms, total_tokens,
                embedding_model, chat_model, error_occurred, error_message
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )
            RETURNING id
            ",
        )
        .bind(&record.question)
        .bind(record.question_length)
        .bind(&record.answer)
        .bind(record.answer_length)
        .bind(record.decision.as_str())
        .bind(record.category.as_str())
        .bind(record.in_domain)
        .bind(record.safe_mode)
        .bind(&record.language)
        .bind(record.best_distance)
        .bind(record.threshold)
        .bind(record.contexts_used)
        .bind(record.embedding_time_ms)
        .bind(record.llm_time_ms)
        .bind(record.total_time_ms)
        .bind(record.total_tokens)
        .bind(&record.embedding_model)
        .bind(&record.chat_model)
        .bind(record.error_occurred)
        .bind(record.error_message.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Aggregates over evaluation logs for the trailing `days` window
    pub async fn metrics_summary(&self, days: i64) -> Result<MetricsSummary> {
        let cutoff = Utc::now() - Duration::days(days);

        let (total_asks, error_count, safe_mode_count, total_tokens) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r"
                SELECT COUNT(*),
                       COUNT(*) FILTER (WHERE error_occurred),
                       COUNT(*) FILTER (WHERE safe_mode),
                       COALESCE(SUM(total_tokens), 0)::int8
                FROM rag_evaluation_logs
                WHERE created_at >= $1
                ",
            )
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await?;

        let decisions = sqlx::query_as::<_, DecisionCount>(
            r"
            SELECT decision, COUNT(*) AS count
            FROM rag_evaluation_logs
            WHERE created_at >= $1
            GROUP BY decision
            ORDER BY count DESC
            ",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let (
            avg_total_time_ms,
            avg_embedding_time_ms,
            avg_llm_time_ms,
            avg_best_distance,
            avg_contexts_used,
        ) = sqlx::query_as::<_, (Option<f64>, Option<f64>, Option<f64>, Option<f64>, Option<f64>)>(
            r"
            SELECT AVG(total_time_ms::float8),
                   AVG(embedding_time_ms::float8),
                   AVG(llm_time_ms::float8),
                   AVG(best_distance),
                   AVG(contexts_used::float8)
            FROM rag_evaluation_logs
            WHERE created_at >= $1
            ",
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;

        let error_rate = if total_asks > 0 {
            error_count as f64 / total_asks as f64
        } else {
            0.0
        };

        Ok(MetricsSummary {
            days,
            total_asks,
            decisions,
            avg_total_time_ms,
            avg_embedding_time_ms,
            avg_llm_time_ms,
            avg_best_distance,
            avg_contexts_used,
            total_tokens,
            error_count,
            error_rate,
            safe_mode_count,
        })
    }
}
