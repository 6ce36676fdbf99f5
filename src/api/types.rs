//! API request and response types

use serde::Deserialize;
use serde::Serialize;

use crate::models::ChatMessage;
use crate::models::ConversationSummary;
use crate::models::DecisionCount;
use crate::models::KnowledgeSource;
use crate::models::MetricsSummary;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Ask request body
#[derive(Debug, Deserialize)]
pub struct AskBody {
    pub question: String,
    #[serde(default, rename = "conversationId")]
    pub conversation_id: Option<i64>,
    /// "en" or "ur"; omitted means English
    #[serde(default)]
    pub language: Option<String>,
}

/// Ask response body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskReply {
    pub answer: String,
    pub conversation_id: Option<i64>,
    pub contexts_used: i32,
}

/// Page selector shared by the list endpoints; each handler clamps to its
/// own defaults
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn clamp(&self, default_limit: i64, max_limit: i64) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(default_limit).clamp(1, max_limit);
        (page, limit)
    }
}

/// Conversation list row
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationItem {
    pub id: i64,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_message_snippet: String,
}

impl From<ConversationSummary> for ConversationItem {
    fn from(summary: ConversationSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            created_at: summary.created_at.to_rfc3339(),
            updated_at: summary.updated_at.to_rfc3339(),
            last_message_snippet: summary
                .last_message
                .map(|content| snippet(&content))
                .unwrap_or_default(),
        }
    }
}

/// Preview is the first 120 characters with a trailing ellipsis
fn snippet(content: &str) -> String {
    let mut preview: String = content.chars().take(120).collect();
    preview.push('…');
    preview
}

/// Conversation list page
#[derive(Debug, Serialize)]
pub struct ConversationPage {
    pub page: i64,
    pub limit: i64,
    pub items: Vec<ConversationItem>,
}

/// Stored message row
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageItem {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

impl From<ChatMessage> for MessageItem {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.id,
            role: message.role,
            content: message.content,
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

/// Message list page for one conversation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub conversation_id: i64,
    pub title: String,
    pub page: i64,
    pub limit: i64,
    pub items: Vec<MessageItem>,
}

/// Rename request body
#[derive(Debug, Deserialize)]
pub struct RenameBody {
    pub title: String,
}

/// Bare acknowledgement
#[derive(Debug, Serialize)]
pub struct OkReply {
    pub ok: bool,
}

impl OkReply {
    pub fn yes() -> Self {
        Self { ok: true }
    }
}

/// Source submission body; text extraction and chunking happen upstream,
/// this takes the resulting chunk texts
#[derive(Debug, Deserialize)]
pub struct SubmitSourceBody {
    pub title: String,
    #[serde(default, rename = "sourceType")]
    pub source_type: Option<String>,
    #[serde(default)]
    pub locator: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    pub chunks: Vec<String>,
}

/// New source acknowledgement
#[derive(Debug, Serialize)]
pub struct SourceCreated {
    pub id: i64,
}

/// Source list row
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceItem {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub language: String,
    pub status: String,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<KnowledgeSource> for SourceItem {
    fn from(source: KnowledgeSource) -> Self {
        Self {
            id: source.id,
            title: source.title,
            source_type: source.source_type,
            language: source.language,
            status: source.status,
            error_message: source.error_message,
            retry_count: source.retry_count,
            created_at: source.created_at.to_rfc3339(),
            updated_at: source.updated_at.to_rfc3339(),
        }
    }
}

/// Source list page
#[derive(Debug, Serialize)]
pub struct SourcePage {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub items: Vec<SourceItem>,
}

/// Metrics window selector
#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub days: Option<i64>,
}

/// Decision count row in the metrics summary
#[derive(Debug, Serialize)]
pub struct DecisionCountItem {
    pub decision: String,
    pub count: i64,
}

/// Aggregated metrics over the trailing window
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReply {
    pub period: String,
    pub total_asks: i64,
    pub decisions: Vec<DecisionCountItem>,
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

impl From<MetricsSummary> for MetricsReply {
    fn from(summary: MetricsSummary) -> Self {
        Self {
            period: format!("Last {} days", summary.days),
            total_asks: summary.total_asks,
            decisions: summary
                .decisions
                .into_iter()
                .map(|DecisionCount { decision, count }| DecisionCountItem { decision, count })
                .collect(),
            avg_total_time_ms: summary.avg_total_time_ms.map(round0),
            avg_embedding_time_ms: summary.avg_embedding_time_ms.map(round0),
            avg_llm_time_ms: summary.avg_llm_time_ms.map(round0),
            avg_best_distance: summary.avg_best_distance.map(|v| round_to(v, 4)),
            avg_contexts_used: summary.avg_contexts_used.map(|v| round_to(v, 2)),
            total_tokens: summary.total_tokens,
            error_count: summary.error_count,
            error_rate: round_to(summary.error_rate, 4),
            safe_mode_count: summary.safe_mode_count,
        }
    }
}

fn round0(value: f64) -> f64 {
    value.round()
}

fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_clamps_to_bounds() {
        let query = PageQuery {
            page: Some(0),
            limit: Some(1000),
        };
        assert_eq!(query.clamp(20, 100), (1, 100));

        let query = PageQuery {
            page: None,
            limit: None,
        };
        assert_eq!(query.clamp(30, 100), (1, 30));

        let query = PageQuery {
            page: Some(3),
            limit: Some(-5),
        };
        assert_eq!(query.clamp(20, 100), (3, 1));
    }

    #[test]
    fn snippet_truncates_at_120_chars() {
        let long = "x".repeat(300);
        let cut = snippet(&long);
        assert_eq!(cut.chars().count(), 121);
        assert!(cut.ends_with('…'));

        let short = snippet("hello");
        assert_eq!(short, "hello…");
    }

    #[test]
    fn rounding_helpers_trim_noise() {
        assert_eq!(round0(1234.56), 1235.0);
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(2.678, 2), 2.68);
    }
}
