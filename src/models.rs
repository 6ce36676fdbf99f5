use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle states of a knowledge source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Queued,
    Processing,
    Done,
    /// Transient failure, eligible for automatic retry
    Failed,
    /// Permanent failure (e.g. no text), never retried automatically
    Invalid,
}

impl SourceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceStatus::Queued => "queued",
            SourceStatus::Processing => "processing",
            SourceStatus::Done => "done",
            SourceStatus::Failed => "failed",
            SourceStatus::Invalid => "invalid",
        }
    }
}

impl From<&str> for SourceStatus {
    fn from(value: &str) -> Self {
        match value {
            "processing" => SourceStatus::Processing,
            "done" => SourceStatus::Done,
            "failed" => SourceStatus::Failed,
            "invalid" => SourceStatus::Invalid,
            _ => SourceStatus::Queued,
        }
    }
}

/// Chat message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Classifier verdict for an incoming question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryCategory {
    InDomainLegal,
    GreetingOrAppHelp,
    OutOfDomain,
    PromptInjectionOrMisuse,
    Emergency,
}

impl QueryCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryCategory::InDomainLegal => "IN_DOMAIN_LEGAL",
            QueryCategory::GreetingOrAppHelp => "GREETING_OR_APP_HELP",
            QueryCategory::OutOfDomain => "OUT_OF_DOMAIN",
            QueryCategory::PromptInjectionOrMisuse => "PROMPT_INJECTION_OR_MISUSE",
            QueryCategory::Emergency => "EMERGENCY",
        }
    }

    /// Map a model-emitted label; anything unrecognized is treated as legal
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "GREETING_OR_APP_HELP" => QueryCategory::GreetingOrAppHelp,
            "OUT_OF_DOMAIN" => QueryCategory::OutOfDomain,
            "PROMPT_INJECTION_OR_MISUSE" => QueryCategory::PromptInjectionOrMisuse,
            "EMERGENCY" => QueryCategory::Emergency,
            _ => QueryCategory::InDomainLegal,
        }
    }
}

/// Terminal outcome of one ask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteDecision {
    /// Sources were close enough; a grounded answer was composed
    Answer,
    /// Retrieval returned nothing
    NoHits,
    /// Retrieval returned hits, none within the threshold
    OutOfDomain,
    Greeting,
    Emergency,
    Refused,
    Error,
}

impl RouteDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteDecision::Answer => "ANSWER",
            RouteDecision::NoHits => "NO_HITS",
            RouteDecision::OutOfDomain => "OUT_OF_DOMAIN",
            RouteDecision::Greeting => "GREETING",
            RouteDecision::Emergency => "EMERGENCY",
            RouteDecision::Refused => "REFUSED",
            RouteDecision::Error => "ERROR",
        }
    }
}

/// Registered knowledge source (one document or URL)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KnowledgeSource {
    pub id: i64,
    pub title: String,
    /// File extension ("pdf", "txt", ...) or "url"
    pub source_type: String,
    /// Storage path or URL; never dereferenced here
    pub locator: String,
    pub language: String,
    /// sha256 over the chunk texts, hex encoded
    pub content_hash: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeSource {
    pub fn status(&self) -> SourceStatus {
        SourceStatus::from(self.status.as_str())
    }
}

/// One embedded chunk of a source
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KnowledgeChunk {
    pub id: i64,
    pub source_id: i64,
    pub chunk_text: String,
    /// NULL until ingestion embeds it; NULL chunks are invisible to search
    pub embedding: Option<pgvector::Vector>,
    pub created_at: DateTime<Utc>,
}

/// Submission payload for a new source; chunking happens upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSource {
    pub title: String,
    pub source_type: String,
    pub locator: String,
    pub language: String,
    pub chunk_texts: Vec<String>,
}

/// Search hit with L2 distance to the query embedding
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChunkHit {
    pub chunk_id: i64,
    pub chunk_text: String,
    pub distance: f64,
}

/// One chat thread owned by a user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatConversation {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Conversation list row with the latest message for preview
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversationSummary {
    pub id: i64,
    pub title: String,
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored chat turn
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub user_id: i64,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Classifier output after confidence gating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: QueryCategory,
    pub confidence: f64,
    pub topic: String,
}

/// Audit record emitted for every ask, persisted off the request path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub question: String,
    pub question_length: i32,
    pub answer: String,
    pub answer_length: i32,
    pub decision: RouteDecision,
    pub category: QueryCategory,
    pub in_domain: bool,
    pub safe_mode: bool,
    pub language: String,
    pub best_distance: Option<f64>,
    pub threshold: Option<f64>,
    pub contexts_used: i32,
    pub embedding_time_ms: Option<i32>,
    pub llm_time_ms: Option<i32>,
    pub total_time_ms: i32,
    pub total_tokens: Option<i32>,
    pub embedding_model: String,
    pub chat_model: String,
    pub error_occurred: bool,
    pub error_message: Option<String>,
}

/// Persisted evaluation row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RagEvaluationLog {
    pub id: i64,
    pub question: String,
    pub question_length: i32,
    pub answer: String,
    pub answer_length: i32,
    pub decision: String,
    pub category: String,
    pub in_domain: bool,
    pub safe_mode: bool,
    pub language: String,
    pub best_distance: Option<f64>,
    pub threshold: Option<f64>,
    pub contexts_used: i32,
    pub embedding_time_ms: Option<i32>,
    pub llm_time_ms: Option<i32>,
    pub total_time_ms: i32,
    pub total_tokens: Option<i32>,
    pub embedding_model: String,
    pub chat_model: String,
    pub error_occurred: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-decision count for the metrics summary
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DecisionCount {
    pub decision: String,
    pub count: i64,
}

/// Aggregates over evaluation logs for a trailing window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub days: i64,
    pub total_asks: i64,
    pub decisions: Vec<DecisionCount>,
    pub avg_total_time_ms: Option<f64>,
    pub avg_embedding_time_ms: Option<f64>,
    pub avg_llm_time_ms: Option<f64>,
    pub avg_best_distance: Option<f64>,
    pub avg_contexts_used: Option<f64>,
    pub total_tokens: i64,
    pub error_count: i64,
    pub error_rate: f64,
    pub safe_mode_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_labels_round_trip() {
        for category in [
            QueryCategory::InDomainLegal,
            QueryCategory::GreetingOrAppHelp,
            QueryCategory::OutOfDomain,
            QueryCategory::PromptInjectionOrMisuse,
            QueryCategory::Emergency,
        ] {
            assert_eq!(QueryCategory::from_label(category.as_str()), category);
        }
    }

    #[test]
    fn unknown_category_label_is_legal() {
        assert_eq!(
            QueryCategory::from_label("SOMETHING_NEW"),
            QueryCategory::InDomainLegal
        );
        assert_eq!(QueryCategory::from_label(""), QueryCategory::InDomainLegal);
        assert_eq!(
            QueryCategory::from_label(" EMERGENCY "),
            QueryCategory::Emergency
        );
    }

    #[test]
    fn source_status_string_round_trip() {
        for status in [
            SourceStatus::Queued,
            SourceStatus::Processing,
            SourceStatus::Done,
            SourceStatus::Failed,
            SourceStatus::Invalid,
        ] {
            assert_eq!(SourceStatus::from(status.as_str()), status);
        }
    }

    #[test]
    fn decision_serde_uses_wire_labels() {
        let json = serde_json::to_string(&RouteDecision::NoHits).unwrap();
        assert_eq!(json, "\"NO_HITS\"");
        let parsed: RouteDecision = serde_json::from_str("\"OUT_OF_DOMAIN\"").unwrap();
        assert_eq!(parsed, RouteDecision::OutOfDomain);
    }
}
