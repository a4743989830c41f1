//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path given as the first CLI argument (must exist)
//! 2. Default location (optional; built-in defaults apply when absent):
//!    - **Linux/macOS:** `~/.pricecatcher-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.pricecatcher-mcp\config.json`
//!
//! Environment variables (`PRICECATCHER_RATE_LIMIT_PER_MINUTE`,
//! `PRICECATCHER_RATE_LIMIT_PER_HOUR`, `PRICECATCHER_API_BASE_URL`) are
//! applied on top of the file before validation.

mod settings;

pub use settings::{
    Config, HttpConfig, LoggingConfig, ProviderConfig, ProviderKind, RateLimitConfig,
    ENV_API_BASE_URL, ENV_RATE_LIMIT_PER_HOUR, ENV_RATE_LIMIT_PER_MINUTE,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.pricecatcher-mcp/`
/// - **Windows:** `%USERPROFILE%\.pricecatcher-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".pricecatcher-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads, overrides from the environment, and validates the configuration.
///
/// If `path` is `None`, uses the platform-specific default location and
/// falls back to built-in defaults when no file exists there.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - An environment override is malformed
/// - Validation fails
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => read_config_file(p)?,
        None => match default_config_path() {
            Some(p) if p.exists() => read_config_file(&p)?,
            _ => Config::default(),
        },
    };

    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;

    Ok(config)
}

/// Reads and parses one configuration file without validating it.
fn read_config_file(config_path: &Path) -> Result<Config, ConfigError> {
    if !config_path.exists() {
        return Err(ConfigError::NotFound {
            path: config_path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.to_path_buf(),
        source: e,
    })
}
