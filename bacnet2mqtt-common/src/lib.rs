//! bacnet2mqtt common library
//!
//! Shared types and utilities for the BACnet/MQTT gateway:
//!
//! - [`value`] - Scalar value model and BACnet application tags
//! - [`object`] - Object identifiers, object keys, component-type lookup
//! - [`topics`] - MQTT topic builders and parsers
//! - [`command`] - Write command and write status types
//! - [`config`] - MQTT and logging configuration (JSON5 format)
//! - [`error`] - Error types

pub mod command;
pub mod config;
pub mod error;
pub mod object;
pub mod topics;
pub mod value;

// Re-export commonly used types at the crate root
pub use command::{WriteCommand, WritePayload, WriteStatus};
pub use config::{LogFormat, LoggingConfig, MqttConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use object::{ObjectId, component_type, PROP_OBJECT_LIST, PROP_PRESENT_VALUE};
pub use topics::{
    availability_topic, command_topic_filter, parse_command_topic, state_topic,
    write_status_topic, ParsedCommandTopic,
};
pub use value::{ApplicationTag, Value};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
