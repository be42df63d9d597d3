//! AI Provider Port - Interface for LLM completions used by expense extraction.
//!
//! The extractor builds a prompt (and optionally a receipt image), asks the
//! provider for a JSON completion, and validates the result itself. Nothing
//! here knows about budgets or expenses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An LLM that answers one request with one completion.
#[async_trait]
pub trait AIProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AIError>;

    /// Name, model and capabilities; checked before sending a receipt.
    fn provider_info(&self) -> ProviderInfo;
}

/// Request for AI completion.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Ask the provider to constrain output to a JSON object.
    pub json_output: bool,
}

impl CompletionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text message.
    pub fn with_message(mut self, role: MessageRole, content: impl Into<String>) -> Self {
        self.messages.push(Message::new(role, content));
        self
    }

    /// Adds a prebuilt message, e.g. one carrying an image.
    pub fn with(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Inline images, sent alongside the text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Attaches an image to this message.
    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.push(image);
        self
    }
}

/// Role of the message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Raw image bytes with their media type (e.g. `image/jpeg`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub media_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: FinishReason,
}

impl CompletionResponse {
    /// The model hit the token limit, so `content` is likely cut-off JSON.
    pub fn is_truncated(&self) -> bool {
        self.finish_reason == FinishReason::Length
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

/// Provider information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name (e.g., "openai").
    pub name: String,
    /// Model identifier (e.g., "gpt-4o").
    pub model: String,
    /// Whether image inputs are accepted.
    pub supports_images: bool,
}

impl ProviderInfo {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            supports_images: false,
        }
    }

    pub fn with_images(mut self, supports: bool) -> Self {
        self.supports_images = supports;
        self
    }
}

/// AI provider errors.
#[derive(Debug, thiserror::Error)]
pub enum AIError {
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u32 },

    #[error("content filtered: {reason}")]
    ContentFiltered { reason: String },

    #[error("provider unavailable: {message}")]
    Unavailable { message: String },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u32 },
}

impl AIError {
    pub fn rate_limited(retry_after_secs: u32) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    pub fn content_filtered(reason: impl Into<String>) -> Self {
        Self::ContentFiltered {
            reason: reason.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AIError::RateLimited { .. }
                | AIError::Unavailable { .. }
                | AIError::Network(_)
                | AIError::Timeout { .. }
        )
    }
}
