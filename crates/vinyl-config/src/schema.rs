//! Configuration schema types.
//!
//! This module defines the structure of every configuration section.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use vinyl_telemetry::{LogConfig, StoreBackend};

/// Server configuration section.
///
/// # Example
///
/// ```
/// use vinyl_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "0.0.0.0:8080".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.shutdown_timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "127.0.0.1:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Time allowed to receive a request body, in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Largest request body accepted, in bytes. Larger bodies get 413.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Graceful shutdown timeout as a [`Duration`].
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_http_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// How the rate limiter derives a client identity from a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKey {
    /// IP address of the TCP peer.
    #[default]
    PeerIp,
    /// First entry of `X-Forwarded-For`, falling back to the peer IP.
    ForwardedFor,
    /// One shared identity for every request.
    Global,
}

/// Rate limiting configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Install the rate limit stage.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period after which a client's count resets, in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests allowed inside one window before rejection.
    #[serde(default = "default_threshold")]
    pub threshold: u64,

    /// Identity extraction strategy.
    #[serde(default)]
    pub key: ClientKey,

    /// Upper bound on tracked client identities.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Idle time after which a client record is reclaimed. Defaults to the window.
    #[serde(default)]
    pub idle_ttl_secs: Option<u64>,
}

impl RateLimitConfig {
    /// Window as a [`Duration`].
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Idle TTL as a [`Duration`], falling back to the window.
    #[must_use]
    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl_secs
            .map_or_else(|| self.window(), Duration::from_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: default_window_secs(),
            threshold: default_threshold(),
            key: ClientKey::default(),
            max_clients: default_max_clients(),
            idle_ttl_secs: None,
        }
    }
}

fn default_window_secs() -> u64 {
    15
}

fn default_threshold() -> u64 {
    5
}

fn default_max_clients() -> usize {
    100_000
}

/// Metrics configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Backend the aggregate snapshot is persisted to.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Seconds between snapshot saves. Zero disables periodic saves.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
}

impl MetricsConfig {
    /// Snapshot interval, or `None` when periodic saves are disabled.
    #[must_use]
    pub fn snapshot_interval(&self) -> Option<Duration> {
        (self.snapshot_interval_secs > 0).then(|| Duration::from_secs(self.snapshot_interval_secs))
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            snapshot_interval_secs: default_snapshot_interval(),
        }
    }
}

fn default_snapshot_interval() -> u64 {
    60
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines (production).
    #[default]
    Json,
    /// Human-readable output (development).
    Pretty,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Install a log subscriber at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive, e.g. "info" or "`vinyl_server=debug`".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Converts this section into the subscriber settings used by `init_logging`.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        let base = match self.format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            ..base
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, "127.0.0.1:8080");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.request_timeout(), Duration::from_millis(30000));
        assert_eq!(config.max_body_bytes, 1_048_576);
    }

    #[test]
    fn test_rate_limit_defaults() {
        let config = RateLimitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.window(), Duration::from_secs(15));
        assert_eq!(config.threshold, 5);
        assert_eq!(config.key, ClientKey::PeerIp);
        assert_eq!(config.max_clients, 100_000);
        assert_eq!(config.idle_ttl(), config.window());
    }

    #[test]
    fn test_idle_ttl_override() {
        let config = RateLimitConfig {
            idle_ttl_secs: Some(300),
            ..Default::default()
        };
        assert_eq!(config.idle_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_snapshot_interval_zero_disables() {
        let config = MetricsConfig {
            snapshot_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.snapshot_interval(), None);
        assert_eq!(
            MetricsConfig::default().snapshot_interval(),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_client_key_names() {
        let key: ClientKey = serde_json::from_str("\"forwarded_for\"").unwrap();
        assert_eq!(key, ClientKey::ForwardedFor);
        let key: ClientKey = serde_json::from_str("\"global\"").unwrap();
        assert_eq!(key, ClientKey::Global);
    }

    #[test]
    fn test_logging_to_log_config() {
        let pretty = LoggingConfig {
            enabled: true,
            level: "debug".to_string(),
            format: LogFormat::Pretty,
        };
        let log = pretty.to_log_config();
        assert!(!log.json_format);
        assert_eq!(log.level, "debug");

        let log = LoggingConfig::default().to_log_config();
        assert!(log.json_format);
        assert_eq!(log.level, "info");
    }
}
