//! BACnet to MQTT gateway.
//!
//! Polls BACnet devices per-device on cron schedules, publishes
//! present values as retained MQTT telemetry and executes write
//! commands arriving over MQTT.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use bacnet2mqtt::bridge::MqttBridge;
use bacnet2mqtt::config::{DriverKind, GatewayConfig};
use bacnet2mqtt::orchestrator::Orchestrator;
use bacnet2mqtt::sim::SimDriver;
use bacnet2mqtt::store::ConfigStore;
use bacnet2mqtt::transport::BacnetTransport;
use bacnet2mqtt_common::LoggingConfig;

/// BACnet to MQTT gateway.
#[derive(Parser, Debug)]
#[command(name = "bacnet2mqtt")]
#[command(about = "Polls BACnet devices and bridges them to MQTT")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "bacnet2mqtt.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = GatewayConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    bacnet2mqtt_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting bacnet2mqtt");
    info!("Loaded configuration from {:?}", args.config);

    info!("Connecting to MQTT broker {}:{}", config.mqtt.broker, config.mqtt.port);
    let (bridge, commands) = MqttBridge::connect(&config.mqtt, &config.gateway_id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to MQTT broker: {}", e))?;
    let bridge = Arc::new(bridge);

    let driver = match config.bacnet.driver {
        DriverKind::Sim => {
            info!("Using simulated BACnet network");
            Arc::new(SimDriver::new())
        }
    };

    let transport = Arc::new(BacnetTransport::new(
        driver,
        Duration::from_secs(config.bacnet.discovery_window_secs),
    ));

    let store = ConfigStore::open(&config.config_dir)
        .with_context(|| format!("Failed to open config store at {:?}", config.config_dir))?;

    let mut orchestrator = Orchestrator::new(store, transport, bridge.clone());
    let loaded = orchestrator
        .load_stored_configs()
        .await
        .context("Failed to load device configs")?;

    info!(
        "Gateway '{}' running with {} device(s)",
        config.gateway_id, loaded
    );

    let shutdown = CancellationToken::new();
    let orchestrator_task = tokio::spawn(orchestrator.run(commands, shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    shutdown.cancel();
    if let Err(e) = orchestrator_task.await {
        error!("Orchestrator task failed: {}", e);
    }

    // The last-will covers unclean exits; on a clean one we retract
    // availability ourselves.
    if let Err(e) = bridge.publish_offline().await {
        error!("Failed to publish offline status: {}", e);
    }

    info!("Gateway stopped");
    Ok(())
}
