// Configuration File Support
//
// This module provides configuration parsing for the Codeforge gateway.
// JSON (config.json) and TOML (*.toml) are both accepted, with environment
// variable overrides applied on top. The live, hot-reloaded view of the file
// is held by `ConfigStore` in `store.rs`.

pub mod store;

pub use store::{ConfigStore, RefreshOutcome};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::registry::QuotaConfig;

/// Errors raised while reading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but is not a valid configuration
    #[error("Malformed config file {path}: {reason}")]
    Malformed { path: String, reason: String },
}

impl ConfigError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::Unreadable { .. } => "ConfigUnreadableError",
            ConfigError::Malformed { .. } => "ConfigMalformedError",
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to
    pub host: String,

    /// Port the HTTP server binds to
    pub port: u16,

    /// Path to the persisted token store
    pub token_path: String,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Per-token quota configuration
    pub quota: QuotaConfig,

    /// Generation backend configuration
    pub backend: BackendConfig,

    /// Config refresh loop timing
    pub refresh: RefreshConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            token_path: "tokens.json".to_string(),
            logging: LoggingConfig::default(),
            quota: QuotaConfig::default(),
            backend: BackendConfig::default(),
            refresh: RefreshConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Endpoint receiving generation requests
    pub url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Default maximum generated length
    pub max_length: u32,

    /// Default sampling temperature
    pub temperature: f64,

    /// Default nucleus sampling probability
    pub top_p: f64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000/generate".to_string(),
            timeout_secs: 30,
            max_length: 64,
            temperature: 0.8,
            top_p: 0.9,
        }
    }
}

impl BackendConfig {
    /// Get request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Config refresh loop timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefreshConfig {
    /// Delay between successful polls, in milliseconds
    pub poll_interval_ms: u64,

    /// Delay after a failed read, in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            retry_backoff_ms: 3000,
        }
    }
}

impl RefreshConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to run the metrics scrape server
    pub enabled: bool,

    /// Port for metrics server
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl Config {
    /// Load configuration from a specific path
    ///
    /// Files ending in `.toml` are parsed as TOML, everything else as JSON.
    /// Environment overrides are applied before validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Unreadable`] if the file cannot be read
    /// (including when it does not exist) and [`ConfigError::Malformed`] if
    /// it cannot be parsed or fails validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: display.clone(),
            source,
        })?;

        let config = Self::parse(&content, is_toml(path)).map_err(|reason| {
            ConfigError::Malformed {
                path: display.clone(),
                reason,
            }
        })?;

        let config = config.apply_overrides_from(|key| std::env::var(key).ok());

        config.validate().map_err(|reason| ConfigError::Malformed {
            path: display,
            reason,
        })?;

        Ok(config)
    }

    fn parse(content: &str, toml_format: bool) -> Result<Self, String> {
        if toml_format {
            toml::from_str(content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(content).map_err(|e| e.to_string())
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides take precedence over file values:
    /// - CODEFORGE_HOST
    /// - CODEFORGE_PORT
    /// - CODEFORGE_TOKEN_PATH
    /// - CODEFORGE_LOG_LEVEL
    /// - CODEFORGE_LOG_FORMAT
    /// - CODEFORGE_BACKEND_URL
    /// - CODEFORGE_METRICS_ENABLED
    /// - CODEFORGE_METRICS_PORT
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CODEFORGE_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("CODEFORGE_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.port = port;
            }
        }
        if let Some(path) = lookup("CODEFORGE_TOKEN_PATH") {
            self.token_path = path;
        }

        if let Some(level) = lookup("CODEFORGE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CODEFORGE_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(url) = lookup("CODEFORGE_BACKEND_URL") {
            self.backend.url = url;
        }

        if let Some(enabled) = lookup("CODEFORGE_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }
        if let Some(port) = lookup("CODEFORGE_METRICS_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.metrics.port = port;
            }
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ))
            }
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => {
                return Err(format!(
                    "Invalid log format: {}. Must be one of: json, pretty, compact",
                    self.logging.format
                ))
            }
        }

        if self.host.trim().is_empty() {
            return Err("Host must not be empty".to_string());
        }
        if self.port == 0 {
            return Err("Port must be > 0".to_string());
        }
        if self.token_path.trim().is_empty() {
            return Err("token_path must not be empty".to_string());
        }

        if self.backend.url.trim().is_empty() {
            return Err("Backend url must not be empty".to_string());
        }
        if self.backend.timeout_secs == 0 {
            return Err("Backend timeout must be > 0".to_string());
        }
        if !(0.0..=2.0).contains(&self.backend.temperature) {
            return Err(format!(
                "Backend temperature {} must be within [0, 2]",
                self.backend.temperature
            ));
        }
        if !(self.backend.top_p > 0.0 && self.backend.top_p <= 1.0) {
            return Err(format!(
                "Backend top_p {} must be within (0, 1]",
                self.backend.top_p
            ));
        }

        self.quota.validate()?;

        if self.refresh.poll_interval_ms == 0 {
            return Err("Refresh poll interval must be > 0".to_string());
        }
        if self.refresh.retry_backoff_ms == 0 {
            return Err("Refresh retry backoff must be > 0".to_string());
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err("Metrics port must be > 0".to_string());
        }

        Ok(())
    }

    /// Socket address string the server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level, String> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| format!("Failed to parse log level: {}", e))
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn temp_with_suffix(suffix: &str, content: &str) -> NamedTempFile {
        let file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        fs::write(file.path(), content).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8000);
        assert_eq!(config.token_path, "tokens.json");
        assert_eq!(config.refresh.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.refresh.retry_backoff(), Duration::from_secs(3));
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_port() {
        let mut config = Config::default();
        config.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_token_path() {
        let mut config = Config::default();
        config.token_path = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_sampling_ranges() {
        let mut config = Config::default();
        config.backend.temperature = 3.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.backend.top_p = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_refresh_intervals() {
        let mut config = Config::default();
        config.refresh.retry_backoff_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.refresh.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_nonexistent_file_is_unreadable() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension("missing");
        let err = Config::load_from_path(&path).unwrap_err();
        assert_eq!(err.kind(), "ConfigUnreadableError");
    }

    #[test]
    fn test_load_valid_json_config() {
        let file = temp_with_suffix(
            ".json",
            r#"{"host": "0.0.0.0", "port": 8080, "token_path": "/var/lib/codeforge/tokens.json"}"#,
        );

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.token_path, "/var/lib/codeforge/tokens.json");
        // Other sections fall back to defaults
        assert_eq!(config.backend, BackendConfig::default());
    }

    #[test]
    fn test_load_valid_toml_config() {
        let file = temp_with_suffix(
            ".toml",
            r#"
host = "0.0.0.0"
port = 9000
token_path = "tokens.json"

[quota]
default_limit = 5
window_secs = 60

[backend]
url = "http://backend:5000/generate"
timeout_secs = 10
"#,
        );

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.quota.default_limit, 5);
        assert_eq!(config.backend.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_invalid_json_is_malformed() {
        let file = temp_with_suffix(".json", r#"{"host": "#);
        let err = Config::load_from_path(file.path()).unwrap_err();
        assert_eq!(err.kind(), "ConfigMalformedError");
    }

    #[test]
    fn test_load_invalid_values_is_malformed() {
        let file = temp_with_suffix(".json", r#"{"port": 0}"#);
        let err = Config::load_from_path(file.path()).unwrap_err();
        assert_eq!(err.kind(), "ConfigMalformedError");
        assert!(err.to_string().contains("Port"));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CODEFORGE_HOST", "0.0.0.0"),
            ("CODEFORGE_PORT", "9999"),
            ("CODEFORGE_LOG_LEVEL", "debug"),
            ("CODEFORGE_METRICS_ENABLED", "true"),
        ]);

        let config =
            Config::default().apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9999);
        assert_eq!(config.logging.level, "debug");
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_overrides_invalid_values_keep_defaults() {
        let env: HashMap<&str, &str> =
            HashMap::from([("CODEFORGE_PORT", "not-a-port"), ("CODEFORGE_METRICS_ENABLED", "maybe")]);

        let config =
            Config::default().apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.port, 8000);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_structural_equality() {
        let a = Config::default();
        let mut b = Config::default();
        assert_eq!(a, b);

        b.backend.top_p = 0.5;
        assert_ne!(a, b);
    }

    #[test]
    fn test_log_level_parsing() {
        let mut config = Config::default();
        config.logging.level = "debug".to_string();
        assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);

        config.logging.level = "invalid".to_string();
        assert!(config.log_level().is_err());
    }

    #[test]
    fn test_bind_addr() {
        assert_eq!(Config::default().bind_addr(), "127.0.0.1:8000");
    }
}
