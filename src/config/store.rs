//! Remote store configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Remote store configuration
///
/// Without a `database_url` the binary runs against the in-memory store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// PostgreSQL connection URL
    pub database_url: Option<String>,

    /// Maximum connections allowed
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Channel the change trigger publishes on
    #[serde(default = "default_notify_channel")]
    pub notify_channel: String,
}

impl StoreConfig {
    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref().filter(|url| !url.is_empty())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Validate store configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(url) = self.database_url() {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(ValidationError::InvalidDatabaseUrl);
            }
        }
        if self.max_connections == 0 || self.max_connections > 100 {
            return Err(ValidationError::InvalidPoolSize);
        }
        let channel_ok = !self.notify_channel.is_empty()
            && self
                .notify_channel
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !channel_ok {
            return Err(ValidationError::InvalidChannel);
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            notify_channel: default_notify_channel(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_notify_channel() -> String {
    "spend_simple_changes".to_string()
}
