use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// MQTT broker connection configuration.
///
/// Transport security is configuration handed to the client, not
/// bridge logic: set `tls` (and optionally `ca_cert`) and the driver
/// does the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or address.
    pub broker: String,

    /// Broker port (default 1883, or 8883 with TLS).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Client ID; derived from the gateway id when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Use TLS for the broker connection.
    #[serde(default)]
    pub tls: bool,

    /// Path to a PEM CA certificate; required when `tls` is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    60
}

impl MqttConfig {
    /// Create a configuration for a plain-text broker connection.
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            port: default_port(),
            client_id: None,
            username: None,
            password: None,
            tls: false,
            ca_cert: None,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "Loading config file");

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    json5::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mqtt_config() {
        let json5 = r#"
        {
            broker: "broker.local",
            username: "gw",
            password: "secret",
            tls: true,
            ca_cert: "/etc/bacnet2mqtt/ca.pem",
        }
        "#;

        let config: MqttConfig = parse_config(json5).unwrap();

        assert_eq!(config.broker, "broker.local");
        assert_eq!(config.port, 1883);
        assert_eq!(config.username.as_deref(), Some("gw"));
        assert!(config.tls);
        assert_eq!(
            config.ca_cert,
            Some(PathBuf::from("/etc/bacnet2mqtt/ca.pem"))
        );
        assert_eq!(config.keep_alive_secs, 60);
    }

    #[test]
    fn test_default_logging() {
        let config: LoggingConfig = parse_config("{}").unwrap();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Text);
    }

    #[test]
    fn test_json_logging_format() {
        let config: LoggingConfig =
            parse_config(r#"{ level: "debug", format: "json" }"#).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
    }
}
