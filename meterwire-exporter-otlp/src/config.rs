//! Configuration for the OTLP export client.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use meterwire_common::LoggingConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// OTLP/gRPC export client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpConfig {
    /// Collector endpoint (e.g., "http://localhost:4317").
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Headers attached to every outgoing call (e.g., for authentication).
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Per-export timeout in seconds. Zero disables the deadline; uploads
    /// are then bounded only by caller cancellation.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            logging: LoggingConfig::default(),
        }
    }
}

impl OtlpConfig {
    /// Get the per-export timeout as a Duration. `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Get the connection timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: OtlpConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: OtlpConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::Validation(
                "OTLP endpoint cannot be empty".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "connect_timeout_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let json = "{}";
        let config = OtlpConfig::parse(json).unwrap();

        assert_eq!(config.endpoint, "http://localhost:4317");
        assert!(config.headers.is_empty());
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            endpoint: "http://collector:4317",
            timeout_secs: 60,
            connect_timeout_secs: 5,
            headers: {
                "authorization": "Bearer token123"
            },
            logging: {
                level: "debug",
                format: "json"
            }
        }"#;

        let config = OtlpConfig::parse(json).unwrap();

        assert_eq!(config.endpoint, "http://collector:4317");
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(
            config.headers.get("authorization"),
            Some(&"Bearer token123".to_string())
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let json = r#"{ timeout_secs: 0 }"#;
        let config = OtlpConfig::parse(json).unwrap();

        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_validate_empty_endpoint() {
        let json = r#"{ endpoint: "" }"#;

        let result = OtlpConfig::parse(json);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("endpoint"));
    }

    #[test]
    fn test_validate_zero_connect_timeout() {
        let json = r#"{ connect_timeout_secs: 0 }"#;

        let result = OtlpConfig::parse(json);
        assert!(result.is_err());
    }
}
