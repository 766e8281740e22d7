//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use vinyl_telemetry::StoreBackend;

use crate::{ClientKey, ConfigError, LogFormat, VinylConfig};

/// Environment prefix used by the `vinyld` binary.
pub const DEFAULT_ENV_PREFIX: &str = "VINYL";

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values, or a preset
/// 2. Configuration files and strings (TOML or JSON), merged in call order
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use vinyl_config::ConfigLoader;
///
/// # fn main() -> Result<(), vinyl_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("vinyl.toml")?
///     .with_env_prefix("VINYL")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: VinylConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: VinylConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = VinylConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = VinylConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension: `.toml` or `.json`. Values in the
    /// file are merged onto the current configuration, so keys the file omits
    /// keep the preset or earlier file value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file does not exist, cannot be read, or
    /// contains invalid or unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let format = Self::file_format(path)?;
        self.merge_content(&content, format)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format ("toml" or "json").
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use vinyl_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [rate_limit]
    ///     threshold = 10
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.rate_limit.threshold, 10);
    /// assert_eq!(config.rate_limit.window_secs, 15);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let format = match format.to_lowercase().as_str() {
            "toml" => FileFormat::Toml,
            "json" => FileFormat::Json,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        self.merge_content(content, format)?;
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// Variables take the form `PREFIX__SECTION__KEY`, for example
    /// `VINYL__RATE_LIMIT__THRESHOLD=10` or `VINYL__METRICS__BACKEND=memory`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file from the working directory, if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a `.env` file exists but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::validation_error(format!(
                "failed to load .env file: {e}"
            ))),
        }
    }

    /// Apply environment overrides, validate and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or validation fails.
    pub fn load(mut self) -> Result<VinylConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Return the configuration without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> VinylConfig {
        self.config
    }

    fn file_format(path: &Path) -> Result<FileFormat, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(FileFormat::Toml),
            Some("json") => Ok(FileFormat::Json),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    /// Merges `content` onto the current configuration.
    ///
    /// The content is first parsed on its own so unknown fields and type
    /// errors are reported in the source format.
    fn merge_content(&mut self, content: &str, format: FileFormat) -> Result<(), ConfigError> {
        let overlay: serde_json::Value = match format {
            FileFormat::Toml => {
                let _: VinylConfig = toml::from_str(content)?;
                toml::from_str(content)?
            }
            FileFormat::Json => {
                let _: VinylConfig = serde_json::from_str(content)?;
                serde_json::from_str(content)?
            }
        };

        let mut merged = serde_json::to_value(&self.config)?;
        merge_values(&mut merged, overlay);
        self.config = serde_json::from_value(merged)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        let mut vars: Vec<(String, String)> =
            env::vars().filter(|(k, _)| k.starts_with(&marker)).collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();

        match parts.as_slice() {
            ["SERVER", "HTTP_ADDR"] => {
                self.config.server.http_addr = value.to_string();
            }
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                self.config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                self.config.server.request_timeout_ms = parse_number(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => {
                self.config.server.max_body_bytes = parse_number(key, value)?;
            }

            ["RATE_LIMIT", "ENABLED"] => {
                self.config.rate_limit.enabled = parse_flag(key, value)?;
            }
            ["RATE_LIMIT", "WINDOW_SECS"] => {
                self.config.rate_limit.window_secs = parse_number(key, value)?;
            }
            ["RATE_LIMIT", "THRESHOLD"] => {
                self.config.rate_limit.threshold = parse_number(key, value)?;
            }
            ["RATE_LIMIT", "KEY"] => {
                self.config.rate_limit.key = match value.to_lowercase().as_str() {
                    "peer_ip" => ClientKey::PeerIp,
                    "forwarded_for" => ClientKey::ForwardedFor,
                    "global" => ClientKey::Global,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'peer_ip', 'forwarded_for', or 'global'",
                        ))
                    }
                };
            }
            ["RATE_LIMIT", "MAX_CLIENTS"] => {
                self.config.rate_limit.max_clients = parse_number(key, value)?;
            }
            ["RATE_LIMIT", "IDLE_TTL_SECS"] => {
                self.config.rate_limit.idle_ttl_secs = if value.is_empty() {
                    None
                } else {
                    Some(parse_number(key, value)?)
                };
            }

            ["METRICS", "BACKEND"] => {
                self.config.metrics.backend = StoreBackend::from_str(value)
                    .map_err(|e| ConfigError::env_parse_error(key, e.to_string()))?;
            }
            ["METRICS", "SNAPSHOT_INTERVAL_SECS"] => {
                self.config.metrics.snapshot_interval_secs = parse_number(key, value)?;
            }

            ["LOGGING", "ENABLED"] => {
                self.config.logging.enabled = parse_flag(key, value)?;
            }
            ["LOGGING", "LEVEL"] => {
                self.config.logging.level = value.to_string();
            }
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }

            // Unknown keys are ignored so unrelated VINYL__* variables do not break startup.
            _ => {}
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum FileFormat {
    Toml,
    Json,
}

/// Recursively overlays `overlay` onto `base`. Tables merge key by key; any
/// other value replaces the base value.
fn merge_values(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, VinylConfig::default());
    }

    #[test]
    fn test_loader_with_development() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"rate_limit": {"threshold": 3, "key": "global"}}"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.rate_limit.threshold, 3);
        assert_eq!(config.rate_limit.key, ClientKey::Global);
        assert_eq!(config.server.http_addr, "127.0.0.1:8080");
    }

    #[test]
    fn test_loader_with_unknown_format() {
        let result = ConfigLoader::new().with_string("a: 1", "yaml");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/vinyl.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_file_merges_onto_preset() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[logging]\nlevel = \"trace\"\n\n[rate_limit]\nthreshold = 9").unwrap();

        let config = ConfigLoader::new()
            .with_development()
            .with_file(file.path())
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.metrics.snapshot_interval_secs, 0);
        assert_eq!(config.rate_limit.threshold, 9);
        assert_eq!(config.rate_limit.window_secs, 15);
    }

    #[test]
    fn test_later_strings_override_earlier_ones() {
        let config = ConfigLoader::new()
            .with_string("[rate_limit]\nthreshold = 2\nwindow_secs = 30\n", "toml")
            .unwrap()
            .with_string(r#"{"rate_limit": {"threshold": 7}}"#, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.rate_limit.threshold, 7);
        assert_eq!(config.rate_limit.window_secs, 30);
    }

    #[test]
    fn test_merge_values_replaces_scalars_and_merges_tables() {
        let mut base = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 3});
        merge_values(&mut base, serde_json::json!({"a": {"y": 5}, "b": null}));
        assert_eq!(base, serde_json::json!({"a": {"x": 1, "y": 5}, "b": null}));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/vinyl.toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:8080");
    }

    #[test]
    fn test_loader_with_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [server]
            http_addr = "0.0.0.0:9000"

            [rate_limit]
            window_secs = 30
            threshold = 8
            key = "forwarded_for"
            max_clients = 500
            idle_ttl_secs = 120

            [metrics]
            backend = "memory"
            snapshot_interval_secs = 0

            [logging]
            level = "warn"
            format = "pretty"
            "#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();

        assert_eq!(config.server.http_addr, "0.0.0.0:9000");
        assert_eq!(config.server.shutdown_timeout_secs, 30);
        assert_eq!(config.rate_limit.window_secs, 30);
        assert_eq!(config.rate_limit.threshold, 8);
        assert_eq!(config.rate_limit.key, ClientKey::ForwardedFor);
        assert_eq!(config.rate_limit.max_clients, 500);
        assert_eq!(config.rate_limit.idle_ttl_secs, Some(120));
        assert_eq!(config.metrics.snapshot_interval(), None);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_loader_with_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"metrics": {{"backend": "postgres"}}}}"#).unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();

        assert_eq!(config.metrics.backend, StoreBackend::Relational);
    }

    #[test]
    fn test_loader_rejects_unknown_field_in_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[rate_limit]\nburst = 10").unwrap();

        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_rejects_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_loader_validates_file_values() {
        let result = ConfigLoader::new()
            .with_string("[rate_limit]\nthreshold = 0\n", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_loader_load_unvalidated() {
        let config = ConfigLoader::new()
            .with_string("[rate_limit]\nwindow_secs = 0\n", "toml")
            .unwrap()
            .load_unvalidated();

        assert_eq!(config.rate_limit.window_secs, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));

        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));

        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    // Overrides are exercised through apply_env_var so tests never mutate the
    // process environment.

    #[test]
    fn test_apply_env_var_server() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__SERVER__HTTP_ADDR", "192.168.1.1:9000", "TEST").unwrap();
        loader.apply_env_var("TEST__SERVER__REQUEST_TIMEOUT_MS", "500", "TEST").unwrap();
        loader.apply_env_var("TEST__SERVER__MAX_BODY_BYTES", "4096", "TEST").unwrap();
        assert_eq!(loader.config.server.http_addr, "192.168.1.1:9000");
        assert_eq!(loader.config.server.request_timeout_ms, 500);
        assert_eq!(loader.config.server.max_body_bytes, 4096);
    }

    #[test]
    fn test_apply_env_var_rate_limit() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("VINYL__RATE_LIMIT__THRESHOLD", "10", "VINYL").unwrap();
        loader.apply_env_var("VINYL__RATE_LIMIT__WINDOW_SECS", "60", "VINYL").unwrap();
        loader.apply_env_var("VINYL__RATE_LIMIT__KEY", "forwarded_for", "VINYL").unwrap();
        loader.apply_env_var("VINYL__RATE_LIMIT__ENABLED", "off", "VINYL").unwrap();
        loader.apply_env_var("VINYL__RATE_LIMIT__IDLE_TTL_SECS", "90", "VINYL").unwrap();

        let rate_limit = &loader.config.rate_limit;
        assert_eq!(rate_limit.threshold, 10);
        assert_eq!(rate_limit.window_secs, 60);
        assert_eq!(rate_limit.key, ClientKey::ForwardedFor);
        assert!(!rate_limit.enabled);
        assert_eq!(rate_limit.idle_ttl_secs, Some(90));
    }

    #[test]
    fn test_apply_env_var_metrics_backend() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("VINYL__METRICS__BACKEND", "dynamodb", "VINYL").unwrap();
        assert_eq!(loader.config.metrics.backend, StoreBackend::KeyValue);

        let result = loader.apply_env_var("VINYL__METRICS__BACKEND", "cassandra", "VINYL");
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));
    }

    #[test]
    fn test_apply_env_var_logging() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("VINYL__LOGGING__FORMAT", "pretty", "VINYL").unwrap();
        loader.apply_env_var("VINYL__LOGGING__LEVEL", "debug", "VINYL").unwrap();
        assert_eq!(loader.config.logging.format, LogFormat::Pretty);
        assert_eq!(loader.config.logging.level, "debug");
    }

    #[test]
    fn test_apply_env_var_invalid_integer() {
        let mut loader = ConfigLoader::new();
        let result = loader.apply_env_var("VINYL__RATE_LIMIT__THRESHOLD", "many", "VINYL");
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_env_var_unknown_key_ignored() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("VINYL__CACHE__SIZE", "10", "VINYL").unwrap();
        assert_eq!(loader.config, VinylConfig::default());
    }
}
