//! Configuration types and defaults

use newsavatar_core::{NewsAvatarError, Result, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Relay base URL
    pub proxy_url: String,
    /// Article API base URL
    pub api_url: String,
    /// Retry policy for relay calls
    pub retry: RetryPolicy,
    /// Stats polling interval, in milliseconds
    pub health_poll_interval_ms: u64,
    /// Flat samples before video counts as stalled
    pub stall_samples: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            proxy_url: "http://localhost:3001".to_string(),
            api_url: "http://localhost:8080".to_string(),
            retry: RetryPolicy::default(),
            health_poll_interval_ms: 500,
            stall_samples: 2,
        }
    }
}

impl PlayerConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| NewsAvatarError::InvalidConfiguration {
            field: "player".to_string(),
            reason: e.to_string(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            NewsAvatarError::InvalidConfiguration {
                field: path.as_ref().display().to_string(),
                reason: e.to_string(),
            }
        })?;
        Self::from_toml(&content)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from a variable lookup
    ///
    /// The `REACT_APP_` names take precedence over the short ones so an
    /// existing frontend `.env` file can be reused as is.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("REACT_APP_PROXY_URL").or_else(|| lookup("PROXY_URL")) {
            self.proxy_url = url;
        }
        if let Some(url) = lookup("REACT_APP_API_URL").or_else(|| lookup("API_URL")) {
            self.api_url = url;
        }
    }

    /// Stats polling interval
    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_millis(self.health_poll_interval_ms)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.proxy_url.is_empty() {
            return Err(NewsAvatarError::MissingConfiguration {
                field: "proxy_url".to_string(),
            });
        }
        if self.health_poll_interval_ms == 0 {
            return Err(NewsAvatarError::InvalidConfiguration {
                field: "health_poll_interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.stall_samples == 0 {
            return Err(NewsAvatarError::InvalidConfiguration {
                field: "stall_samples".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
