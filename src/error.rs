//! Error types for pricecatcher-mcp.
//!
//! Protocol-level faults are not represented here; they are JSON-RPC error
//! objects built in [`crate::mcp::protocol`]. These types cover configuration
//! loading and the external price data provider.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// An environment override held an unusable value.
    #[error("invalid value for environment variable {name}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Faults raised by a price data provider.
///
/// These never reach the peer as protocol errors; the tool executor renders
/// them as "service unavailable" content.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The request could not be sent or the connection failed.
    #[error("price service request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("price service returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The response body was not a list of price records.
    #[error("price service returned malformed data: {0}")]
    Decode(#[source] reqwest::Error),

    /// The provider did not answer within the configured timeout.
    #[error("price service did not respond within {} ms", .0.as_millis())]
    Timeout(Duration),

    /// The provider reported itself unavailable.
    #[error("price service unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/path/to/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("config.json"));
    }

    #[test]
    fn validation_error_display() {
        let error = ConfigError::ValidationError {
            message: "invalid setting".to_string(),
        };
        assert!(error.to_string().contains("invalid setting"));
    }

    #[test]
    fn invalid_env_display() {
        let error = ConfigError::InvalidEnv {
            name: "PRICECATCHER_RATE_LIMIT_PER_MINUTE",
            value: "ten".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("PRICECATCHER_RATE_LIMIT_PER_MINUTE"));
        assert!(msg.contains("\"ten\""));
    }

    #[test]
    fn provider_timeout_display() {
        let error = ProviderError::Timeout(Duration::from_millis(2500));
        assert_eq!(
            error.to_string(),
            "price service did not respond within 2500 ms"
        );
    }

    #[test]
    fn provider_status_display() {
        let error = ProviderError::Status { status: 503 };
        assert!(error.to_string().contains("503"));
    }
}
