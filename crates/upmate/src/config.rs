//! Configuration structures for the SDK.
//!
//! Defines the backend location, the store namespace, presentation
//! defaults and transport settings.

use std::path::Path;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::UpdateError;
use crate::presentation::PresentationStyle;

/// Default backend origin.
pub const DEFAULT_BASE_URL: &str = "https://api-6vuago6yaa-uc.a.run.app";

/// Default store namespace when the host has no bundle/service identifier.
pub const DEFAULT_SERVICE: &str = "upmate.default";

/// Main SDK configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpMateConfig {
    /// Backend origin, e.g. `https://updates.example.com`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Namespace / service identifier for the persistent store
    #[serde(default = "default_service")]
    pub service: String,

    /// Style used by `present_update` when the caller passes none
    #[serde(default = "default_presentation_style")]
    pub default_presentation_style: PresentationStyle,

    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for UpMateConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            service: default_service(),
            default_presentation_style: default_presentation_style(),
            network: NetworkConfig::default(),
        }
    }
}

impl UpMateConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, UpdateError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UpdateError::InvalidConfiguration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| UpdateError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), UpdateError> {
        let io_err = |e: std::io::Error| {
            UpdateError::InvalidConfiguration(format!("cannot write {}: {}", path.display(), e))
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| UpdateError::InvalidConfiguration(e.to_string()))?;
        std::fs::write(path, content).map_err(io_err)?;
        Ok(())
    }

    /// Set the backend origin.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the store namespace.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Parse and check the backend origin.
    pub fn base_url(&self) -> Result<Url, UpdateError> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            UpdateError::InvalidConfiguration(format!("invalid base_url {:?}: {}", self.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(UpdateError::InvalidConfiguration(format!(
                "base_url must be an absolute http(s) URL, got {:?}",
                self.base_url
            )));
        }
        Ok(url)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), UpdateError> {
        self.base_url()?;
        if self.service.trim().is_empty() {
            return Err(UpdateError::InvalidConfiguration(
                "service must not be empty".to_string(),
            ));
        }
        if self.network.timeout_seconds == 0 || self.network.connect_timeout_seconds == 0 {
            return Err(UpdateError::InvalidConfiguration(
                "network timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Transport settings for the HTTP client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// User agent override (empty = `upmate/<version>`)
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            user_agent: None,
        }
    }
}

impl NetworkConfig {
    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or_else(|| format!("upmate/{}", env!("CARGO_PKG_VERSION")))
    }
}

// Default value functions for serde
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

fn default_presentation_style() -> PresentationStyle {
    PresentationStyle::FormSheet
}

fn default_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}
