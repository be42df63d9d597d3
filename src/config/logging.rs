//! Logging configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.filter.trim().is_empty() {
            return Err(ValidationError::MissingRequired("logging.filter"));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "spend_simple=info".to_string()
}
