//! Top-level configuration type.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::{
    ConfigError, LogFormat, LoggingConfig, MetricsConfig, RateLimitConfig, ServerConfig,
};

/// Complete Vinyl service configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use vinyl_config::VinylConfig;
///
/// let config = VinylConfig::default();
/// assert_eq!(config.server.http_addr, "127.0.0.1:8080");
/// assert_eq!(config.rate_limit.threshold, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct VinylConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Metrics persistence configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VinylConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `server.http_addr` is not a socket address
    /// - `rate_limit.window_secs`, `rate_limit.threshold` or
    ///   `rate_limit.max_clients` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than 0",
            ));
        }

        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::invalid_value(
                "rate_limit.window_secs",
                "must be greater than 0",
            ));
        }

        if self.rate_limit.threshold == 0 {
            return Err(ConfigError::invalid_value(
                "rate_limit.threshold",
                "must be greater than 0",
            ));
        }

        if self.rate_limit.max_clients == 0 {
            return Err(ConfigError::invalid_value(
                "rate_limit.max_clients",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `server.http_addr` does not parse.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.http_addr.parse().map_err(|_| {
            ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            )
        })
    }

    /// Development preset: pretty debug logs, no periodic snapshots.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.metrics.snapshot_interval_secs = 0;
        config
    }

    /// Production preset: JSON logs on all interfaces.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.server.http_addr = "0.0.0.0:8080".to_string();
        config.logging.format = LogFormat::Json;
        config
    }
}
