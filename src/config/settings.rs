//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Overrides the per-minute request ceiling.
pub const ENV_RATE_LIMIT_PER_MINUTE: &str = "PRICECATCHER_RATE_LIMIT_PER_MINUTE";
/// Overrides the per-hour request ceiling.
pub const ENV_RATE_LIMIT_PER_HOUR: &str = "PRICECATCHER_RATE_LIMIT_PER_HOUR";
/// Points the server at an upstream price service (selects the HTTP provider).
pub const ENV_API_BASE_URL: &str = "PRICECATCHER_API_BASE_URL";

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Per-client request ceilings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Price data provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// HTTP transport settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |message: String| -> Result<(), ConfigError> {
            Err(ConfigError::ValidationError { message })
        };

        if self.rate_limit.per_minute == 0 || self.rate_limit.per_hour == 0 {
            return fail("rate limit ceilings must be greater than zero".to_string());
        }
        if self.rate_limit.per_hour < self.rate_limit.per_minute {
            return fail(format!(
                "per_hour ceiling ({}) cannot be lower than per_minute ceiling ({})",
                self.rate_limit.per_hour, self.rate_limit.per_minute
            ));
        }
        if self.rate_limit.max_clients == 0 {
            return fail("max_clients must be greater than zero".to_string());
        }
        if self.provider.timeout_ms == 0 {
            return fail("provider timeout_ms must be greater than zero".to_string());
        }
        if self.provider.kind == ProviderKind::Http {
            match self.provider.base_url.as_deref() {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(url) => {
                    return fail(format!(
                        "provider base_url '{url}' must start with http:// or https://"
                    ));
                }
                None => return fail("provider kind 'http' requires a base_url".to_string()),
            }
        }
        if self.http.heartbeat_secs == 0 {
            return fail("http heartbeat_secs must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Applies environment variable overrides using `lookup` to read variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric override does not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_u32 = |name: &'static str| -> Result<Option<u32>, ConfigError> {
            lookup(name)
                .map(|value| {
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidEnv { name, value })
                })
                .transpose()
        };

        if let Some(per_minute) = parse_u32(ENV_RATE_LIMIT_PER_MINUTE)? {
            self.rate_limit.per_minute = per_minute;
        }
        if let Some(per_hour) = parse_u32(ENV_RATE_LIMIT_PER_HOUR)? {
            self.rate_limit.per_hour = per_hour;
        }
        if let Some(base_url) = lookup(ENV_API_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.provider.kind = ProviderKind::Http;
            self.provider.base_url = Some(base_url.trim().to_string());
        }
        Ok(())
    }
}

/// Per-client request ceilings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests allowed per client in a 60-second window.
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,

    /// Requests allowed per client in a 3600-second window.
    #[serde(default = "default_per_hour")]
    pub per_hour: u32,

    /// Number of client windows retained before the least recently seen is evicted.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
            max_clients: default_max_clients(),
        }
    }
}

const fn default_per_minute() -> u32 {
    10
}

const fn default_per_hour() -> u32 {
    100
}

const fn default_max_clients() -> usize {
    10_000
}

/// Which price data provider backs the tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Built-in sample table.
    #[default]
    Sample,
    /// Upstream REST price service.
    Http,
}

/// Price data provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Provider implementation.
    #[serde(default)]
    pub kind: ProviderKind,

    /// Base URL of the upstream price service (HTTP provider only).
    #[serde(default)]
    pub base_url: Option<String>,

    /// Upper bound on a single provider call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ProviderConfig {
    /// The provider call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

const fn default_timeout_ms() -> u64 {
    5_000
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Address the HTTP transport binds to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Interval between SSE heartbeat events, in seconds.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl HttpConfig {
    /// The SSE heartbeat interval.
    #[must_use]
    pub const fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

const fn default_heartbeat_secs() -> u64 {
    30
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn parse_minimal_config() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit.per_minute, 10);
        assert_eq!(config.rate_limit.per_hour, 100);
        assert_eq!(config.provider.kind, ProviderKind::Sample);
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "rate_limit": {
                "per_minute": 5,
                "per_hour": 50,
                "max_clients": 100
            },
            "provider": {
                "kind": "http",
                "base_url": "https://prices.example.my/api",
                "timeout_ms": 2500
            },
            "http": {
                "bind": "0.0.0.0:9000",
                "heartbeat_secs": 15
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit.per_minute, 5);
        assert_eq!(config.rate_limit.max_clients, 100);
        assert_eq!(config.provider.kind, ProviderKind::Http);
        assert_eq!(config.provider.timeout(), Duration::from_millis(2500));
        assert_eq!(config.http.bind.port(), 9000);
        assert_eq!(config.http.heartbeat(), Duration::from_secs(15));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn logging_config_defaults() {
        assert_eq!(LoggingConfig::default().level, "warn");
    }

    #[test]
    fn reject_http_provider_without_url() {
        let config: Config = serde_json::from_str(r#"{"provider": {"kind": "http"}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_hour_ceiling_below_minute_ceiling() {
        let json = r#"{"rate_limit": {"per_minute": 20, "per_hour": 10}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("per_hour"));
    }

    #[test]
    fn reject_zero_ceiling() {
        let json = r#"{"rate_limit": {"per_minute": 0}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let result: Result<Config, _> = serde_json::from_str(r#"{"unknown_field": "value"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_ceilings_and_provider() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[
                (ENV_RATE_LIMIT_PER_MINUTE, "3"),
                (ENV_RATE_LIMIT_PER_HOUR, " 30 "),
                (ENV_API_BASE_URL, "https://prices.example.my"),
            ]))
            .unwrap();

        assert_eq!(config.rate_limit.per_minute, 3);
        assert_eq!(config.rate_limit.per_hour, 30);
        assert_eq!(config.provider.kind, ProviderKind::Http);
        assert_eq!(
            config.provider.base_url.as_deref(),
            Some("https://prices.example.my")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_override_rejects_garbage() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(env(&[(ENV_RATE_LIMIT_PER_HOUR, "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn blank_base_url_is_ignored() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[(ENV_API_BASE_URL, "  ")]))
            .unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Sample);
    }
}
