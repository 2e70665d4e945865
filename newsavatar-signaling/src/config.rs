//! Relay server configuration
//!
//! Loaded from a TOML file and/or environment variables. The provider
//! credential is never given a default.

use newsavatar_core::{NewsAvatarError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Default provider base URL
pub const DEFAULT_PROVIDER_URL: &str = "https://api.d-id.com";

/// Relay server configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Provider base URL
    #[serde(default = "default_provider_url")]
    pub provider_url: String,

    /// Provider credential, sent as `Authorization: Basic <api_key>`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Timeout for one forwarded request, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_provider_url() -> String {
    DEFAULT_PROVIDER_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            provider_url: default_provider_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// Keeps the credential out of logs.
impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("provider_url", &self.provider_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl RelayConfig {
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

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| NewsAvatarError::InvalidConfiguration {
            field: "relay".to_string(),
            reason: e.to_string(),
        })
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load configuration from file if it exists, then apply environment overrides
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.as_ref().exists() => Self::from_file(p)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("RELAY_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PROXY_PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(url) = lookup("D_ID_API_URL") {
            self.provider_url = url;
        }
        if let Some(key) = lookup("D_ID_API_KEY").filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(timeout) = lookup("RELAY_REQUEST_TIMEOUT").and_then(|t| t.parse().ok()) {
            self.request_timeout_secs = timeout;
        }
    }

    /// Check that the configuration can serve requests
    pub fn validate(&self) -> Result<()> {
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(NewsAvatarError::MissingConfiguration {
                field: "D_ID_API_KEY".to_string(),
            });
        }
        if self.provider_url.is_empty() {
            return Err(NewsAvatarError::MissingConfiguration {
                field: "provider_url".to_string(),
            });
        }
        self.bind_addr().map(|_| ())
    }

    /// Socket address to bind
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| NewsAvatarError::InvalidConfiguration {
                field: "host".to_string(),
                reason: e.to_string(),
            })
    }

    /// Timeout for one forwarded request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
