//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool size must be between 1 and 100")]
    InvalidPoolSize,

    #[error("Invalid NOTIFY channel name")]
    InvalidChannel,

    #[error("Retry count exceeds maximum allowed (10)")]
    TooManyRetries,

    #[error("Invalid user id")]
    InvalidUserId,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Temperature must be between 0.0 and 2.0")]
    InvalidTemperature,

    #[error("Invalid OpenAI API key format")]
    InvalidOpenAiKey,
}
