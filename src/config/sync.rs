//! Synchronization behaviour configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Retry and merge settings for the sync core
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Retries after the first failed read
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Linear backoff step; retry `n` waits `n * retry_base_delay_ms`
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Apply remote UPDATE/DELETE events to an open expense stream
    #[serde(default)]
    pub merge_remote_updates: bool,
}

impl SyncConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_retries > 10 {
            return Err(ValidationError::TooManyRetries);
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            merge_remote_updates: false,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_base_delay(), Duration::from_millis(1000));
        assert!(!config.merge_remote_updates);
    }

    #[test]
    fn test_validation_too_many_retries() {
        let config = SyncConfig {
            max_retries: 50,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::TooManyRetries));
    }
}
