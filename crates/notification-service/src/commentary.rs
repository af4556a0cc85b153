use crate::CommentaryTemplate;
use async_trait::async_trait;
use market_core::PriceDirection;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Input for one piece of commentary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentaryRequest {
    pub symbol: String,
    pub percent_change: Decimal,
    pub current_price: Decimal,
    pub direction: PriceDirection,
}

/// Short natural-language analysis of a price move. Implementations never fail;
/// they fall back to a templated message instead.
#[async_trait]
pub trait CommentaryGenerator: Send + Sync {
    async fn generate(&self, request: &CommentaryRequest) -> String;

    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum CommentaryError {
    #[error("Language model API key not configured")]
    NotConfigured,
    #[error("Language model request failed: {0}")]
    Request(String),
    #[error("Language model returned HTTP {0}")]
    Status(u16),
    #[error("Language model returned no content")]
    EmptyResponse,
}

#[derive(Debug, Clone)]
pub struct CommentaryConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for CommentaryConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 150,
            temperature: 0.7,
            timeout_secs: 30,
        }
    }
}

impl CommentaryConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("LLM_API_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.api_url),
            api_key: std::env::var("LLM_API_KEY").ok().filter(|s| !s.is_empty()),
            model: std::env::var("LLM_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.model),
            timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            ..defaults
        }
    }
}

/// Pick the LLM-backed generator when a key is configured, the template otherwise.
pub fn commentary_from_config(config: &CommentaryConfig) -> Arc<dyn CommentaryGenerator> {
    if config.api_key.is_some() {
        tracing::info!("AI commentary enabled (model {})", config.model);
        Arc::new(LlmCommentary::new(config.clone()))
    } else {
        tracing::info!("No LLM_API_KEY set, alerts will use templated commentary");
        Arc::new(TemplateCommentary)
    }
}

/// Always answers with the canned template.
pub struct TemplateCommentary;

#[async_trait]
impl CommentaryGenerator for TemplateCommentary {
    async fn generate(&self, request: &CommentaryRequest) -> String {
        CommentaryTemplate::fallback(request)
    }

    fn name(&self) -> &str {
        "template"
    }
}

// OpenAI-compatible chat completion wire types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Commentary from an OpenAI-compatible `/chat/completions` endpoint.
pub struct LlmCommentary {
    config: CommentaryConfig,
    client: Client,
}

impl LlmCommentary {
    pub fn new(config: CommentaryConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("LLM HTTP client setup failed ({}), using defaults without the {}s timeout", e, config.timeout_secs);
                Client::new()
            });
        Self { config, client }
    }

    async fn request_completion(&self, request: &CommentaryRequest) -> Result<String, CommentaryError> {
        let api_key = self.config.api_key.as_deref().ok_or(CommentaryError::NotConfigured)?;
        let url = format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'));

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: CommentaryTemplate::system_prompt().to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: CommentaryTemplate::user_prompt(request),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CommentaryError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CommentaryError::Status(response.status().as_u16()));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| CommentaryError::Request(e.to_string()))?;

        extract_content(completion)
    }
}

fn extract_content(completion: ChatResponse) -> Result<String, CommentaryError> {
    completion
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(CommentaryError::EmptyResponse)
}

#[async_trait]
impl CommentaryGenerator for LlmCommentary {
    async fn generate(&self, request: &CommentaryRequest) -> String {
        match self.request_completion(request).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(symbol = %request.symbol, "AI commentary unavailable, using template: {}", e);
                CommentaryTemplate::fallback(request)
            }
        }
    }

    fn name(&self) -> &str {
        "llm"
    }
}
