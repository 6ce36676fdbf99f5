//! OpenAI-compatible client: covers openai, openrouter, groq and deepseek,
//! which all speak the same embeddings/chat-completions wire format

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::ChatApi;
use super::ChatTurn;
use super::Completion;
use super::CompletionOptions;
use super::EmbeddingApi;
use crate::errors::LexRagError;
use crate::errors::Result;

pub struct OpenAiCompatibleClient {
    provider: String,
    model: String,
    base_url: String,
    api_key: String,
    client: Client,
}

impl OpenAiCompatibleClient {
    /// Create a client for one OpenAI-compatible endpoint
    ///
    /// # Errors
    /// - HTTP client build errors (invalid configuration)
    pub fn new(
        provider: &str,
        model: String,
        base_url: String,
        api_key: String,
    ) -> Result<Self> {
        // Per-request timeouts are set at call sites; the builder only tunes
        // the connection pool
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LexRagError::HttpError(e.to_string()))?;

        Ok(Self {
            provider: provider.to_string(),
            model,
            base_url,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingApi for OpenAiCompatibleClient {
    async fn embed_batch(&self, texts: &[String], timeout: Duration) -> Result<Vec<Vec<f32>>> {
        #[derive(Serialize)]
        struct EmbeddingsRequest<'a> {
            input: &'a [String],
            model: &'a str,
        }

        #[derive(Deserialize)]
        struct EmbeddingsResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            index: usize,
            embedding: Vec<f32>,
        }

        let url = format!("{}/embeddings", self.base_url);
        debug!(
            "Calling {} embeddings API: {} ({} texts)",
            self.provider,
            url,
            texts.len()
        );

        let request = EmbeddingsRequest {
            input: texts,
            model: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LexRagError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LexRagError::EmbeddingError(format!(
                "{} API error {status}: {error_text}",
                self.provider
            )));
        }

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| LexRagError::EmbeddingError(format!("Invalid response: {e}")))?;

        if body.data.len() != texts.len() {
            return Err(LexRagError::EmbeddingError(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        // The API documents input order but also tags each entry; trust the tag
        let mut data = body.data;
        data.sort_by_key(|entry| entry.index);
        Ok(data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl ChatApi for OpenAiCompatibleClient {
    async fn complete(
        &self,
        messages: &[ChatTurn],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        #[derive(Serialize)]
        struct WireMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<WireMessage<'a>>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
            usage: Option<Usage>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: Option<String>,
        }

        #[derive(Deserialize)]
        struct Usage {
            total_tokens: Option<i32>,
        }

        let url = format!("{}/chat/completions", self.base_url);
        debug!("Calling {} chat API: {}", self.provider, url);

        let request = ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|turn| WireMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .timeout(options.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LexRagError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LexRagError::LlmError(format!(
                "{} API error {status}: {error_text}",
                self.provider
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LexRagError::LlmError(format!("Invalid response: {e}")))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LexRagError::LlmError("Empty completion".to_string()))?;

        Ok(Completion {
            text,
            total_tokens: body.usage.and_then(|usage| usage.total_tokens),
        })
    }
}
