//! MQTT topic bridge.
//!
//! Owns the broker connection, translates polled values into retained
//! telemetry publications, decodes inbound command messages into
//! [`WriteCommand`]s and publishes write-status feedback.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS, TlsConfiguration, Transport};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use bacnet2mqtt_common::{
    MqttConfig, ObjectId, Value, WriteCommand, WritePayload, WriteStatus, availability_topic,
    command_topic_filter, parse_command_topic, state_topic, write_status_topic,
};

/// Errors from the MQTT bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("MQTT configuration error: {0}")]
    Config(String),
    #[error("MQTT publish failed: {0}")]
    Publish(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Publish surface of the MQTT client.
///
/// A seam so tests can assert exact publishes without a broker.
#[async_trait]
pub trait MqttPublish: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), BridgeError>;
}

#[async_trait]
impl MqttPublish for AsyncClient {
    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), BridgeError> {
        AsyncClient::publish(self, topic, qos, retain, payload)
            .await
            .map_err(|e| BridgeError::Publish(e.to_string()))
    }
}

/// The gateway's connection to the messaging backbone.
pub struct MqttBridge {
    gateway_id: String,
    publisher: Arc<dyn MqttPublish>,
    connected: Arc<AtomicBool>,
}

impl MqttBridge {
    /// Connect to the broker and start the event-loop task.
    ///
    /// On every (re)connect acknowledgement the task subscribes to the
    /// gateway-scoped command filter and republishes `online`
    /// availability. Decoded write commands arrive on the returned
    /// channel.
    pub async fn connect(
        config: &MqttConfig,
        gateway_id: &str,
    ) -> Result<(Self, mpsc::Receiver<WriteCommand>), BridgeError> {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("bacnet2mqtt-{}", gateway_id));

        let mut options = MqttOptions::new(client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        if config.tls {
            let ca_path = config.ca_cert.as_ref().ok_or_else(|| {
                BridgeError::Config("mqtt.ca_cert is required when tls is enabled".to_string())
            })?;
            let ca = std::fs::read(ca_path)?;
            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            }));
        }

        // Broker tells subscribers we are gone if the session dies
        // without a clean shutdown.
        options.set_last_will(LastWill::new(
            availability_topic(gateway_id),
            "offline",
            QoS::AtLeastOnce,
            true,
        ));

        let (client, mut event_loop) = AsyncClient::new(options, 64);
        let (command_tx, command_rx) = mpsc::channel(64);

        let connected = Arc::new(AtomicBool::new(false));
        let bridge = Self {
            gateway_id: gateway_id.to_string(),
            publisher: Arc::new(client.clone()),
            connected: connected.clone(),
        };

        let gateway = gateway_id.to_string();
        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(gateway_id = %gateway, "Connected to MQTT broker");
                        connected.store(true, Ordering::SeqCst);

                        let filter = command_topic_filter(&gateway);
                        if let Err(e) = client.subscribe(&filter, QoS::AtLeastOnce).await {
                            warn!(filter = %filter, error = %e, "Command subscription failed");
                        }

                        let availability = availability_topic(&gateway);
                        if let Err(e) = client
                            .publish(&availability, QoS::AtLeastOnce, true, "online")
                            .await
                        {
                            warn!(error = %e, "Availability publish failed");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if let Some(command) =
                            decode_command(&gateway, &publish.topic, &publish.payload)
                        {
                            if command_tx.send(command).await.is_err() {
                                info!("Command consumer gone, stopping MQTT event loop");
                                return;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        connected.store(false, Ordering::SeqCst);
                        warn!(error = %e, "MQTT connection error, reconnecting");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok((bridge, command_rx))
    }

    /// Build a bridge over an arbitrary publisher, for tests.
    #[doc(hidden)]
    pub fn with_publisher(gateway_id: impl Into<String>, publisher: Arc<dyn MqttPublish>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            publisher,
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Gateway id namespacing this bridge's topics. Immutable after start.
    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    /// Current broker connectivity, for health reporting.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Publish one retained state message per non-empty entry.
    ///
    /// An empty mapping publishes nothing, guarding against spurious
    /// network calls on empty poll results.
    pub async fn publish_values(
        &self,
        values: &HashMap<String, Value>,
    ) -> Result<(), BridgeError> {
        for (key, value) in values {
            let object: ObjectId = match key.parse() {
                Ok(object) => object,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping value with malformed object key");
                    continue;
                }
            };

            let topic = state_topic(&self.gateway_id, &object);
            let payload = value.to_json();
            debug!(topic = %topic, payload = %payload, "Publishing state");

            self.publisher
                .publish(&topic, QoS::AtLeastOnce, true, payload.into_bytes())
                .await?;
        }

        Ok(())
    }

    /// Publish point-in-time write feedback; not retained.
    pub async fn publish_write_status(
        &self,
        device_id: &str,
        object: &ObjectId,
        property_id: u32,
        status: &WriteStatus,
    ) -> Result<(), BridgeError> {
        let topic = write_status_topic(&self.gateway_id, device_id, object, property_id);
        let payload = serde_json::to_vec(status)
            .map_err(|e| BridgeError::Publish(e.to_string()))?;

        self.publisher
            .publish(&topic, QoS::AtLeastOnce, false, payload)
            .await
    }

    /// Publish retained `offline` availability (clean shutdown path;
    /// the last-will covers unclean ones).
    pub async fn publish_offline(&self) -> Result<(), BridgeError> {
        let topic = availability_topic(&self.gateway_id);
        self.publisher
            .publish(&topic, QoS::AtLeastOnce, true, b"offline".to_vec())
            .await
    }
}

/// Decode an inbound message into a write command.
///
/// Returns `None` for anything that must be dropped: topics of a
/// different shape, other gateways' traffic (routine on a shared
/// broker), malformed JSON and invalid commands. Never panics and
/// never propagates an error into the transport layer.
pub fn decode_command(gateway_id: &str, topic: &str, payload: &[u8]) -> Option<WriteCommand> {
    let parsed = match parse_command_topic(topic) {
        Some(parsed) => parsed,
        None => {
            warn!(topic = %topic, "Dropping message with unparseable command topic");
            return None;
        }
    };

    if parsed.gateway_id != gateway_id {
        debug!(topic = %topic, "Ignoring command for different gateway");
        return None;
    }

    let body: WritePayload = match serde_json::from_slice(payload) {
        Ok(body) => body,
        Err(e) => {
            warn!(topic = %topic, error = %e, "Dropping command with malformed payload");
            return None;
        }
    };

    match WriteCommand::from_payload(parsed.device_id, parsed.object, parsed.property_id, body) {
        Ok(command) => Some(command),
        Err(e) => {
            warn!(topic = %topic, error = %e, "Dropping invalid write command");
            None
        }
    }
}
