//! AI Provider Adapters.
//!
//! Implementations of the AIProvider port, and the extractor built on it.
//!
//! ## Available Adapters
//!
//! - `MockAIProvider` - Configurable mock for testing
//! - `OpenAIProvider` - OpenAI chat models with image input (gpt-4o)
//! - `LlmExpenseExtractor` - `ExpenseExtractor` backed by any `AIProvider`
//! - `UnconfiguredExtractor` - `ExpenseExtractor` that always reports `NotConfigured`

mod llm_extractor;
mod mock_provider;
mod openai_provider;

pub use llm_extractor::{ExtractionSettings, LlmExpenseExtractor, UnconfiguredExtractor};
pub use mock_provider::{MockAIProvider, MockError, MockResponse};
pub use openai_provider::{OpenAIConfig, OpenAIProvider};
