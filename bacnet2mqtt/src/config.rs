//! Configuration for the gateway and the per-device descriptor schema.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use bacnet2mqtt_common::{LoggingConfig, MqttConfig, ObjectId};

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

/// Complete gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Stable identifier namespacing this gateway's topics on the
    /// broker. Immutable after start.
    pub gateway_id: String,

    /// MQTT connection settings.
    pub mqtt: MqttConfig,

    /// BACnet-side settings.
    #[serde(default)]
    pub bacnet: BacnetConfig,

    /// Directory holding per-device descriptor files.
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("devices")
}

/// BACnet protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacnetConfig {
    /// Which driver to instantiate.
    #[serde(default)]
    pub driver: DriverKind,

    /// Discovery collection window in seconds.
    #[serde(default = "default_discovery_window")]
    pub discovery_window_secs: u64,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_discovery_window() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    3000
}

impl Default for BacnetConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::default(),
            discovery_window_secs: default_discovery_window(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

/// Driver selection.
///
/// Wire-level BACnet encoding lives behind [`crate::driver::BacnetDriver`];
/// external drivers plug in through that trait when embedding the crate.
/// The binary ships the built-in simulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Built-in simulated device network.
    #[default]
    Sim,
}

/// Per-device descriptor, one JSON file per device in the config
/// directory.
///
/// File schema:
/// ```json
/// {
///   "device": { "deviceId": "114", "address": "192.168.1.114" },
///   "polling": { "schedule": "*/15 * * * * *" },
///   "objects": [ { "objectId": { "type": 2, "instance": 202 } } ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceDescriptor {
    /// Device identity and network location.
    pub device: DeviceInfo,

    /// Polling schedule.
    pub polling: PollingConfig,

    /// Objects read on each tick.
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
}

impl DeviceDescriptor {
    /// Object list as plain identifiers.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.iter().map(|o| o.object_id).collect()
    }
}

/// Device identity: stable external key plus network address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Stable external key, unique in the registry.
    pub device_id: String,

    /// Network location the driver connects to.
    pub address: String,
}

/// Polling settings for one device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollingConfig {
    /// Cron-style schedule expression (with seconds field),
    /// e.g. `*/15 * * * * *`.
    pub schedule: String,
}

/// One polled object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntry {
    pub object_id: ObjectId,
}

impl GatewayConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: GatewayConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway_id.is_empty() {
            return Err(ConfigError::Validation(
                "gateway_id cannot be empty".to_string(),
            ));
        }

        if self.gateway_id.contains('/') || self.gateway_id.contains(['+', '#']) {
            return Err(ConfigError::Validation(format!(
                "gateway_id '{}' contains MQTT topic separators or wildcards",
                self.gateway_id
            )));
        }

        if self.mqtt.broker.is_empty() {
            return Err(ConfigError::Validation(
                "mqtt.broker cannot be empty".to_string(),
            ));
        }

        if self.bacnet.discovery_window_secs == 0 {
            return Err(ConfigError::Validation(
                "bacnet.discovery_window_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
