//! OpenAI Provider - Implementation of AIProvider for OpenAI's chat API.
//!
//! Sends text and inline receipt images to the chat completions endpoint and
//! optionally constrains the output to a JSON object.
//!
//! # Configuration
//!
//! ```ignore
//! let config = OpenAIConfig::new(api_key)
//!     .with_model("gpt-4o")
//!     .with_base_url("https://api.openai.com/v1");
//!
//! let provider = OpenAIProvider::new(config)?;
//! ```

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{
    AIError, AIProvider, CompletionRequest, CompletionResponse, FinishReason, ImageAttachment,
    MessageRole, ProviderInfo, TokenUsage,
};

/// Configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key for authentication.
    api_key: Secret<String>,
    /// Model to use (e.g., "gpt-4o").
    pub model: String,
    /// Base URL for the API (default: https://api.openai.com/v1).
    pub base_url: String,
    pub timeout: Duration,
    /// Maximum retries on transient failures.
    pub max_retries: u32,
}

impl OpenAIConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 2,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// OpenAI API provider implementation.
pub struct OpenAIProvider {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIProvider {
    /// Creates a new OpenAI provider with the given configuration.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the HTTP client cannot be built.
    pub fn new(config: OpenAIConfig) -> Result<Self, AIError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AIError::InvalidRequest(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    /// Converts our request to OpenAI's format.
    fn to_openai_request(&self, request: &CompletionRequest) -> OpenAIRequest {
        let mut messages = Vec::new();

        if let Some(ref prompt) = request.system_prompt {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: OpenAIContent::Text(prompt.clone()),
            });
        }

        for msg in &request.messages {
            let role = match msg.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            }
            .to_string();

            let content = if msg.images.is_empty() {
                OpenAIContent::Text(msg.content.clone())
            } else {
                let mut parts = vec![ContentPart::Text {
                    text: msg.content.clone(),
                }];
                parts.extend(msg.images.iter().map(|image| ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_url(image),
                    },
                }));
                OpenAIContent::Parts(parts)
            };

            messages.push(OpenAIMessage { role, content });
        }

        OpenAIRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request.json_output.then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        }
    }

    async fn send_request(&self, request: &CompletionRequest) -> Result<Response, AIError> {
        let openai_request = self.to_openai_request(request);

        self.client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key()))
            .header("Content-Type", "application/json")
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AIError::Timeout {
                        timeout_secs: self.config.timeout.as_secs() as u32,
                    }
                } else if e.is_connect() {
                    AIError::network(format!("Connection failed: {}", e))
                } else {
                    AIError::network(e.to_string())
                }
            })
    }

    /// Maps non-success statuses onto `AIError`.
    async fn handle_response_status(&self, response: Response) -> Result<Response, AIError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => Err(AIError::AuthenticationFailed),
            429 => Err(AIError::rate_limited(Self::parse_retry_after(&error_body))),
            400 => Err(AIError::InvalidRequest(error_body)),
            500..=599 => Err(AIError::unavailable(format!(
                "Server error {}: {}",
                status, error_body
            ))),
            _ => Err(AIError::network(format!(
                "Unexpected status {}: {}",
                status, error_body
            ))),
        }
    }

    /// Parses "try again in Xs" out of a rate-limit body; 30s otherwise.
    fn parse_retry_after(error_body: &str) -> u32 {
        let message = serde_json::from_str::<serde_json::Value>(error_body)
            .ok()
            .and_then(|v| v.get("error")?.get("message")?.as_str().map(str::to_string));

        message
            .as_deref()
            .and_then(|s| {
                let rest = &s[s.find("try again in ")? + 13..];
                let end = rest.find(|c: char| !c.is_ascii_digit())?;
                rest[..end].parse::<u32>().ok()
            })
            .unwrap_or(30)
    }

    async fn parse_response(&self, response: Response) -> Result<CompletionResponse, AIError> {
        let response = self.handle_response_status(response).await?;

        let openai_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| AIError::parse(format!("Failed to parse response: {}", e)))?;

        completion_from(openai_response)
    }
}

fn completion_from(openai_response: OpenAIResponse) -> Result<CompletionResponse, AIError> {
    let choice = openai_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AIError::parse("No choices in response"))?;

    let finish_reason = match choice.finish_reason.as_deref() {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    };

    let content = choice
        .message
        .content
        .ok_or_else(|| AIError::parse("Response message has no content"))?;

    let usage = openai_response
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(CompletionResponse {
        content,
        usage,
        model: openai_response.model,
        finish_reason,
    })
}

/// `data:<media type>;base64,<payload>` for an inline image.
fn data_url(image: &ImageAttachment) -> String {
    format!("data:{};base64,{}", image.media_type, BASE64.encode(&image.bytes))
}

#[async_trait]
impl AIProvider for OpenAIProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AIError> {
        let mut retry_count = 0;

        loop {
            let result = match self.send_request(&request).await {
                Ok(response) => self.parse_response(response).await,
                Err(err) => Err(err),
            };

            match result {
                Ok(completion) => return Ok(completion),
                Err(err) if !err.is_retryable() || retry_count >= self.config.max_retries => {
                    return Err(err)
                }
                Err(err) => {
                    tracing::warn!(error = %err, attempt = retry_count + 1, "OpenAI request failed, retrying");
                }
            }

            // Exponential backoff: 1s, 2s, 4s, ...
            sleep(Duration::from_secs(1 << retry_count)).await;
            retry_count += 1;
        }
    }

    fn provider_info(&self) -> ProviderInfo {
        let vision = self.config.model.starts_with("gpt-4o")
            || self.config.model.starts_with("gpt-4-turbo")
            || self.config.model.starts_with("gpt-4.1");
        ProviderInfo::new("openai", &self.config.model).with_images(vision)
    }
}

// ----- OpenAI API Types -----

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: OpenAIContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAIContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
