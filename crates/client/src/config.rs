//! Configuration management for the Vaultwire client.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/vaultwire/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("server host must not be empty")]
    EmptyHost,

    #[error("server port must not be 0")]
    InvalidPort,

    #[error("restart_limit must be between 1 and 100, got {0}")]
    InvalidRestartLimit(u32),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the Vaultwire client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Server connection settings.
    pub server: ServerConfig,

    /// Session persistence settings.
    pub session: SessionConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Server hostname or address.
    pub host: String,

    /// Server TCP port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9997,
        }
    }
}

/// Session persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Where the session credential is stored. `None` means the default
    /// path under the user config directory.
    pub credential_path: Option<PathBuf>,

    /// How many automatic session restarts to attempt before giving up.
    pub restart_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            credential_path: None,
            restart_limit: 3,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter: trace, debug, info, warn or error.
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: "info".to_string(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vaultwire")
        .join("config.toml")
}

/// Returns the default credential file path.
pub fn default_credential_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vaultwire")
        .join("credential.json")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported variables:
    /// - `VAULTWIRE_SERVER_HOST` overrides `server.host`
    /// - `VAULTWIRE_LOG_LEVEL` overrides `logging.log_level`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("VAULTWIRE_SERVER_HOST") {
            if !host.is_empty() {
                tracing::info!("Overriding server host from environment: {}", host);
                self.server.host = host;
            }
        }

        if let Ok(level) = std::env::var("VAULTWIRE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.logging.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if !(1..=100).contains(&self.session.restart_limit) {
            return Err(ConfigError::InvalidRestartLimit(self.session.restart_limit));
        }
        if !VALID_LOG_LEVELS.contains(&self.logging.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.log_level.clone()));
        }
        Ok(())
    }

    /// Resolved credential path: explicit setting or the default location.
    pub fn credential_path(&self) -> PathBuf {
        self.session
            .credential_path
            .clone()
            .unwrap_or_else(default_credential_path)
    }

    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from the default path, falling back to defaults if
    /// the file does not exist.
    pub fn load_default() -> Result<Self> {
        let path = default_config_path();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).context("Failed to parse config TOML")?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }
        let toml_str = self.to_toml()?;
        fs::write(path, toml_str)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
