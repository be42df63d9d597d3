//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `SPEND_SIMPLE` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use spend_simple::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod error;
mod extraction;
mod identity;
mod logging;
mod store;
mod sync;

pub use error::{ConfigError, ValidationError};
pub use extraction::ExtractionConfig;
pub use identity::IdentityConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use store::StoreConfig;
pub use sync::SyncConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Every section has defaults, so an empty environment loads an in-memory,
/// anonymous, extraction-disabled configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Remote store (PostgreSQL connection, NOTIFY channel)
    #[serde(default)]
    pub store: StoreConfig,

    /// Retry and merge behaviour
    #[serde(default)]
    pub sync: SyncConfig,

    /// Current user
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Expense extraction (OpenAI)
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Log format and default filter
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `SPEND_SIMPLE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `SPEND_SIMPLE__STORE__DATABASE_URL=...` -> `store.database_url = ...`
    /// - `SPEND_SIMPLE__SYNC__MAX_RETRIES=5` -> `sync.max_retries = 5`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SPEND_SIMPLE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.store.validate()?;
        self.sync.validate()?;
        self.identity.validate()?;
        self.extraction.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
