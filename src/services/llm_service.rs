use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::GenerationError;

/// Configuration for the text-generation client
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    /// OpenAI-compatible API root, without the trailing `/chat/completions`
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "meta-llama/llama-4-maverick-17b-128e-instruct".to_string(),
            temperature: 0.7,
        }
    }
}

/// Trait for text-generation providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate free text from a system instruction and a prompt, producing at most
    /// `max_output_tokens` tokens.
    async fn generate(
        &self,
        system_instruction: &str,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, GenerationError>;

    fn model(&self) -> &str;
}

/// Chat completion request/response structures
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Provider for any OpenAI-compatible chat completions API (Groq by default).
pub struct OpenAiCompatibleProvider {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &LlmConfig, api_key: String, timeout: Duration) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            client,
        })
    }

    async fn call_chat(&self, request: &ChatRequest<'_>) -> Result<ChatResponse, GenerationError> {
        let response = self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout
                } else {
                    GenerationError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await
                .unwrap_or_else(|_| "Unknown error".to_string());
            if is_content_policy_rejection(&error_text) {
                return Err(GenerationError::ContentPolicy(error_text));
            }
            return Err(GenerationError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        response.json::<ChatResponse>()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))
    }
}

fn is_content_policy_rejection(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("content_policy") || body.contains("content_filter") || body.contains("safety")
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn generate(
        &self,
        system_instruction: &str,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, GenerationError> {
        info!("Generating narrative (model: {}, max_tokens: {})", self.model, max_output_tokens);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system_instruction },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: max_output_tokens,
            temperature: self.temperature,
        };

        let response = self.call_chat(&request).await?;

        let choice = response.choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::InvalidResponse("No choices in response".to_string()))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(GenerationError::ContentPolicy("completion was filtered".to_string()));
        }
        if choice.finish_reason.as_deref() == Some("length") {
            warn!("Narrative truncated at {} tokens", max_output_tokens);
        }

        let content = choice.message.content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GenerationError::InvalidResponse("Empty completion".to_string()))?;

        if let Some(usage) = response.usage {
            info!("Narrative generated. Tokens: {} prompt + {} completion = {} total",
                  usage.prompt_tokens, usage.completion_tokens, usage.total_tokens);
        }

        Ok(content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Text-generation front door: a provider when configured, `Disabled` otherwise.
pub struct LlmService {
    provider: Option<Arc<dyn LlmProvider>>,
}

impl LlmService {
    pub fn new(config: &LlmConfig, timeout: Duration) -> Self {
        let provider = if !config.enabled {
            info!("LLM features are disabled in configuration");
            None
        } else {
            match config.api_key.as_deref().filter(|k| !k.is_empty()) {
                None => {
                    warn!("LLM API key not configured. LLM features disabled.");
                    None
                }
                Some(key) => match OpenAiCompatibleProvider::new(config, key.to_string(), timeout) {
                    Ok(provider) => {
                        info!("Initializing LLM service with model {} at {}", config.model, config.base_url);
                        Some(Arc::new(provider) as Arc<dyn LlmProvider>)
                    }
                    Err(e) => {
                        warn!("Failed to initialize LLM provider: {}. LLM features disabled.", e);
                        None
                    }
                },
            }
        };

        Self { provider }
    }

    pub fn with_provider(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider: Some(provider) }
    }

    pub fn disabled() -> Self {
        Self { provider: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Model name of the configured provider, if any.
    pub fn model(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.model())
    }

    pub async fn generate(
        &self,
        system_instruction: &str,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, GenerationError> {
        let provider = self.provider.as_ref()
            .ok_or(GenerationError::Disabled)?;

        provider.generate(system_instruction, prompt, max_output_tokens).await
    }
}
