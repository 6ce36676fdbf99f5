//! Provider capability interfaces for remote embedding and chat models
//!
//! Each wire protocol gets one implementation; the concrete client is picked
//! once at construction from config, so the rest of the crate only sees the
//! `EmbeddingApi` / `ChatApi` traits.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ChatConfig;
use crate::config::EmbeddingsConfig;
use crate::errors::LexRagError;
use crate::errors::Result;

mod anthropic;
mod openai;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiCompatibleClient;

/// Author of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One prompt message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling and budget knobs for one completion call
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Completion text plus usage when the provider reports it
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub total_tokens: Option<i32>,
}

/// Remote embedding capability
#[async_trait]
pub trait EmbeddingApi: Send + Sync {
    /// Embed a batch of texts, one vector per input, input order preserved
    async fn embed_batch(&self, texts: &[String], timeout: Duration) -> Result<Vec<Vec<f32>>>;
}

/// Opaque Debug for the trait object so `Result<Arc<dyn EmbeddingApi>>` can be
/// unwrapped; implementors hold key material and are not required to be Debug
impl fmt::Debug for dyn EmbeddingApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn EmbeddingApi")
    }
}

/// Remote chat-completion capability
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatTurn],
        options: &CompletionOptions,
    ) -> Result<Completion>;
}

/// Default API base per OpenAI-compatible provider
fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        "anthropic" => Some("https://api.anthropic.com"),
        _ => None,
    }
}

/// Conventional key env var per provider
fn api_key_env_var(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("OPENAI_API_KEY"),
        "openrouter" => Some("OPENROUTER_API_KEY"),
        "groq" => Some("GROQ_API_KEY"),
        "deepseek" => Some("DEEPSEEK_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        _ => None,
    }
}

/// Config key wins; the provider's env var is the fallback. The error names
/// the provider and env var but never echoes key material.
fn resolve_api_key(provider: &str, configured: Option<&String>) -> Result<String> {
    if let Some(key) = configured {
        if !key.is_empty() {
            return Ok(key.clone());
        }
    }
    let env_var = api_key_env_var(provider)
        .ok_or_else(|| LexRagError::ConfigError(format!("Unknown provider: {provider}")))?;
    match std::env::var(env_var) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(LexRagError::ConfigError(format!(
            "No API key for provider '{provider}': set it in config.toml or via {env_var}"
        ))),
    }
}

fn resolve_base_url(provider: &str, configured: Option<&String>) -> Result<String> {
    let base = match configured {
        Some(url) if !url.is_empty() => url.clone(),
        _ => default_base_url(provider)
            .ok_or_else(|| LexRagError::ConfigError(format!("Unknown provider: {provider}")))?
            .to_string(),
    };
    url::Url::parse(&base)
        .map_err(|e| LexRagError::ConfigError(format!("Invalid base URL for {provider}: {e}")))?;
    Ok(base.trim_end_matches('/').to_string())
}

/// Build the embedding backend named by config
///
/// Anthropic has no embeddings endpoint, so configuring it here is rejected
/// up front rather than failing on the first request.
pub fn embedding_api_from_config(config: &EmbeddingsConfig) -> Result<Arc<dyn EmbeddingApi>> {
    match config.provider.as_str() {
        "openai" | "openrouter" | "groq" | "deepseek" => {
            let client = OpenAiCompatibleClient::new(
                &config.provider,
                config.model.clone(),
                resolve_base_url(&config.provider, config.base_url.as_ref())?,
                resolve_api_key(&config.provider, config.api_key.as_ref())?,
            )?;
            Ok(Arc::new(client))
        }
        "anthropic" => Err(LexRagError::ConfigError(
            "Provider 'anthropic' does not offer an embeddings API".to_string(),
        )),
        other => Err(LexRagError::ConfigError(format!(
            "Unknown embeddings provider: {other}"
        ))),
    }
}

/// Build the chat backend named by config
pub fn chat_api_from_config(config: &ChatConfig) -> Result<Arc<dyn ChatApi>> {
    match config.provider.as_str() {
        "openai" | "openrouter" | "groq" | "deepseek" => {
            let client = OpenAiCompatibleClient::new(
                &config.provider,
                config.model.clone(),
                resolve_base_url(&config.provider, config.base_url.as_ref())?,
                resolve_api_key(&config.provider, config.api_key.as_ref())?,
            )?;
            Ok(Arc::new(client))
        }
        "anthropic" => {
            let client = AnthropicClient::new(
                config.model.clone(),
                resolve_base_url("anthropic", config.base_url.as_ref())?,
                resolve_api_key("anthropic", config.api_key.as_ref())?,
            )?;
            Ok(Arc::new(client))
        }
        other => Err(LexRagError::ConfigError(format!(
            "Unknown chat provider: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_providers_have_base_urls() {
        for provider in ["openai", "openrouter", "groq", "deepseek", "anthropic"] {
            assert!(default_base_url(provider).is_some(), "{provider}");
        }
        assert!(default_base_url("ollama").is_none());
    }

    #[test]
    fn configured_base_url_wins_and_is_normalized() {
        let configured = "http://localhost:8000/v1/".to_string();
        let resolved = resolve_base_url("openai", Some(&configured)).unwrap();
        assert_eq!(resolved, "http://localhost:8000/v1");
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let configured = "not a url".to_string();
        let err = resolve_base_url("openai", Some(&configured)).unwrap_err();
        assert!(matches!(err, LexRagError::ConfigError(_)));
    }

    #[test]
    fn configured_key_beats_environment() {
        let key = "sk-test-key".to_string();
        assert_eq!(
            resolve_api_key("openai", Some(&key)).unwrap(),
            "sk-test-key"
        );
    }

    #[test]
    fn anthropic_embeddings_rejected_at_construction() {
        let config = crate::config::EmbeddingsConfig {
            provider: "anthropic".to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            dimension: 3072,
            base_url: None,
            api_key: Some("sk-ant-test".to_string()),
            request_timeout_secs: 40,
            batch_timeout_secs: 60,
            max_batch_size: 100,
        };
        let err = embedding_api_from_config(&config).unwrap_err();
        assert!(matches!(err, LexRagError::ConfigError(_)));
    }
}
