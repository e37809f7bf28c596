//! Configuration management for the upmate CLI
//!
//! Configuration is stored in TOML format. Values resolve in this order,
//! first match wins: command-line flag, environment variable, config file,
//! built-in default.
//!
//! # Configuration File Locations
//!
//! - Linux: `~/.config/upmate/cli.toml`
//! - macOS: `~/Library/Application Support/dev.upmate.upmate/cli.toml`
//! - Windows: `%APPDATA%\upmate\upmate\config\cli.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use upmate::{UpMateConfig, UpdateError};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<UpdateError> for ConfigError {
    fn from(err: UpdateError) -> Self {
        Self::ValidationError(err.to_string())
    }
}

/// CLI configuration
///
/// # Example TOML
///
/// ```toml
/// [sdk]
/// base_url = "https://api-6vuago6yaa-uc.a.run.app"
/// service = "upmate.default"
/// default_presentation_style = "formSheet"
///
/// [credentials]
/// # api_key = ""       # or UPMATE_API_KEY
/// # app_version = ""   # or UPMATE_APP_VERSION
///
/// [storage]
/// backend = "file"  # "file" | "memory" | "keychain"
/// # dir = ""        # Empty = default data directory
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// SDK configuration
    #[serde(default)]
    pub sdk: UpMateConfig,

    /// Credentials and app identity
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Persistent store selection
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Credentials configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Tenant API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Version reported as the running app version
    #[serde(default)]
    pub app_version: Option<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store backend: "file", "memory" or "keychain"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Directory for the file store (empty = default data directory)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_backend() -> String {
    "file".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            dir: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive: "error", "warn", "info", "upmate=debug"...
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub app_version: Option<String>,
    pub base_url: Option<String>,
    pub service: Option<String>,
    pub store_dir: Option<PathBuf>,
    pub store_backend: Option<String>,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from custom path or default
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = custom_path {
            Self::load(path)
        } else {
            Self::load_default()
        }
    }

    /// Get default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "upmate", "upmate")
            .map(|dirs| dirs.config_dir().join("cli.toml"))
    }

    /// Get the data directory path (file store lives here)
    pub fn data_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "upmate", "upmate")
            .map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Directory for the file store, falling back to the working directory.
    pub fn store_dir(&self) -> PathBuf {
        self.storage
            .dir
            .clone()
            .or_else(Self::data_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create default configuration file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool, ConfigError> {
        if let Some(path) = Self::default_path() {
            if !path.exists() {
                Self::default().save(&path)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Apply command-line and environment overrides on top of file values.
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(api_key) = &overrides.api_key {
            self.credentials.api_key = Some(api_key.clone());
        }
        if let Some(app_version) = &overrides.app_version {
            self.credentials.app_version = Some(app_version.clone());
        }
        if let Some(base_url) = &overrides.base_url {
            self.sdk.base_url = base_url.clone();
        }
        if let Some(service) = &overrides.service {
            self.sdk.service = service.clone();
        }
        if let Some(dir) = &overrides.store_dir {
            self.storage.dir = Some(dir.clone());
        }
        if let Some(backend) = &overrides.store_backend {
            self.storage.backend = backend.clone();
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sdk.validate()?;

        let valid_backends = ["file", "memory", "keychain"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid storage backend '{}'. Valid values: {:?}",
                self.storage.backend, valid_backends
            )));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging level must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use upmate::PresentationStyle;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.backend, "file");
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("cli.toml");

        let mut config = Config::default();
        config.credentials.app_version = Some("3.1.0".to_string());
        config.sdk.default_presentation_style = PresentationStyle::Popover;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.credentials.app_version.as_deref(), Some("3.1.0"));
        assert_eq!(loaded.sdk.default_presentation_style, PresentationStyle::Popover);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cli.toml");
        std::fs::write(&path, "[storage]\nbackend = \"memory\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.sdk, UpMateConfig::default());
    }

    #[test]
    fn test_invalid_backend_rejected() {
        let mut config = Config::default();
        config.storage.backend = "floppy".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = Config::default();
        config.credentials.api_key = Some("from-file".to_string());
        config.sdk.base_url = "https://file.example.com".to_string();

        let overrides = CliOverrides {
            api_key: Some("from-flag".to_string()),
            base_url: Some("http://localhost:8080".to_string()),
            ..Default::default()
        };
        let config = config.with_overrides(&overrides);

        assert_eq!(config.credentials.api_key.as_deref(), Some("from-flag"));
        assert_eq!(config.sdk.base_url, "http://localhost:8080");
        assert_eq!(config.storage.backend, "file");
    }

    #[test]
    fn test_store_dir_override() {
        let config = Config::default().with_overrides(&CliOverrides {
            store_dir: Some(PathBuf::from("/tmp/upmate-test")),
            ..Default::default()
        });
        assert_eq!(config.store_dir(), PathBuf::from("/tmp/upmate-test"));
    }
}
