//! Mock AI Provider for testing.
//!
//! Returns queued completions (or errors) in order and records every request
//! so tests can inspect the prompt the extractor built.
//!
//! # Example
//!
//! ```ignore
//! let provider = MockAIProvider::new()
//!     .with_response(r#"{"transactions":[]}"#)
//!     .with_delay(Duration::from_millis(100));
//!
//! let response = provider.complete(request).await?;
//! assert_eq!(provider.call_count(), 1);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{
    AIError, AIProvider, CompletionRequest, CompletionResponse, FinishReason, ProviderInfo,
    TokenUsage,
};

/// Mock AI provider for testing.
#[derive(Debug, Clone)]
pub struct MockAIProvider {
    /// Pre-configured responses (consumed in order).
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    info: ProviderInfo,
    /// Simulated latency per request.
    delay: Duration,
    /// Call history for verification.
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

/// A configured mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Success { content: String },
    /// Content cut off at the token limit.
    Truncated { content: String },
    Error(MockError),
}

/// Mock error types for testing error handling.
#[derive(Debug, Clone)]
pub enum MockError {
    RateLimited { retry_after_secs: u32 },
    ContentFiltered { reason: String },
    Unavailable { message: String },
    AuthenticationFailed,
    Network { message: String },
    Timeout { timeout_secs: u32 },
}

impl From<MockError> for AIError {
    fn from(err: MockError) -> Self {
        match err {
            MockError::RateLimited { retry_after_secs } => AIError::rate_limited(retry_after_secs),
            MockError::ContentFiltered { reason } => AIError::content_filtered(reason),
            MockError::Unavailable { message } => AIError::unavailable(message),
            MockError::AuthenticationFailed => AIError::AuthenticationFailed,
            MockError::Network { message } => AIError::network(message),
            MockError::Timeout { timeout_secs } => AIError::Timeout { timeout_secs },
        }
    }
}

impl Default for MockAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockAIProvider {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            info: ProviderInfo::new("mock", "mock-model-1").with_images(true),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Adds a successful response to the queue.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        lock(&self.responses).push_back(MockResponse::Success {
            content: content.into(),
        });
        self
    }

    pub fn with_truncated_response(self, content: impl Into<String>) -> Self {
        lock(&self.responses).push_back(MockResponse::Truncated {
            content: content.into(),
        });
        self
    }

    /// Adds an error response to the queue.
    pub fn with_error(self, error: MockError) -> Self {
        lock(&self.responses).push_back(MockResponse::Error(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_provider_info(mut self, info: ProviderInfo) -> Self {
        self.info = info;
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Returns all recorded calls.
    pub fn get_calls(&self) -> Vec<CompletionRequest> {
        lock(&self.calls).clone()
    }

    /// Gets the next response; an empty transaction list once the queue is drained.
    fn next_response(&self) -> MockResponse {
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| MockResponse::Success {
                content: r#"{"transactions":[]}"#.to_string(),
            })
    }
}

#[async_trait]
impl AIProvider for MockAIProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AIError> {
        lock(&self.calls).push(request);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        match self.next_response() {
            MockResponse::Success { content } => Ok(CompletionResponse {
                content,
                usage: TokenUsage::new(10, 20),
                model: self.info.model.clone(),
                finish_reason: FinishReason::Stop,
            }),
            MockResponse::Truncated { content } => Ok(CompletionResponse {
                content,
                usage: TokenUsage::new(10, 1024),
                model: self.info.model.clone(),
                finish_reason: FinishReason::Length,
            }),
            MockResponse::Error(err) => Err(err.into()),
        }
    }

    fn provider_info(&self) -> ProviderInfo {
        self.info.clone()
    }
}
