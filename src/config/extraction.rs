//! Expense extraction configuration

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// OpenAI-backed extraction settings. Extraction is disabled without a key.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// OpenAI API key
    pub openai_api_key: Option<Secret<String>>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl ExtractionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The API key when one is set and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_ref()
            .map(|k| k.expose_secret().as_str())
            .filter(|k| !k.is_empty())
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(key) = self.api_key() {
            if !key.starts_with("sk-") {
                return Err(ValidationError::InvalidOpenAiKey);
            }
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::InvalidTemperature);
        }
        Ok(())
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            model: default_model(),
            timeout_secs: default_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.7
}
