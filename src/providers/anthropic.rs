//! Anthropic messages API client (chat only; Anthropic has no embeddings API)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::ChatApi;
use super::ChatRole;
use super::ChatTurn;
use super::Completion;
use super::CompletionOptions;
use crate::errors::LexRagError;
use crate::errors::Result;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    model: String,
    base_url: String,
    api_key: String,
    client: Client,
}

impl AnthropicClient {
    /// Create a messages API client
    ///
    /// # Errors
    /// - HTTP client build errors (invalid configuration)
    pub fn new(model: String, base_url: String, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LexRagError::HttpError(e.to_string()))?;

        Ok(Self {
            model,
            base_url,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl ChatApi for AnthropicClient {
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
        struct MessagesRequest<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            #[serde(skip_serializing_if = "Option::is_none")]
            system: Option<String>,
            messages: Vec<WireMessage<'a>>,
        }

        #[derive(Deserialize)]
        struct MessagesResponse {
            content: Vec<ContentBlock>,
            usage: Option<Usage>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            text: String,
        }

        #[derive(Deserialize)]
        struct Usage {
            input_tokens: Option<i32>,
            output_tokens: Option<i32>,
        }

        // The messages API takes the system prompt as a top-level field, not
        // as a conversation turn
        let system_parts: Vec<&str> = messages
            .iter()
            .filter(|turn| turn.role == ChatRole::System)
            .map(|turn| turn.content.as_str())
            .collect();
        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        let wire_messages: Vec<WireMessage<'_>> = messages
            .iter()
            .filter(|turn| turn.role != ChatRole::System)
            .map(|turn| WireMessage {
                role: turn.role.as_str(),
                content: &turn.content,
            })
            .collect();

        let url = format!("{}/v1/messages", self.base_url);
        debug!("Calling anthropic messages API: {}", url);

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            system,
            messages: wire_messages,
        };

        let response = self
            .client
            .post(&url)
            .timeout(options.timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
                "anthropic API error {status}: {error_text}"
            )));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LexRagError::LlmError(format!("Invalid response: {e}")))?;

        let text = body
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text)
            .ok_or_else(|| LexRagError::LlmError("Empty completion".to_string()))?;

        let total_tokens = body.usage.map(|usage| {
            usage.input_tokens.unwrap_or(0) + usage.output_tokens.unwrap_or(0)
        });

        Ok(Completion {
            text,
            total_tokens,
        })
    }
}
