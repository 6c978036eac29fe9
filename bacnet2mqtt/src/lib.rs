//! BACnet to MQTT gateway.
//!
//! Polls BACnet devices on a per-device cron schedule and republishes
//! present values as retained MQTT state topics; subscribes to a
//! gateway-scoped command topic and turns well-formed messages into
//! BACnet property writes with status feedback.
//!
//! # Topics
//!
//! ```text
//! homeassistant/<component>/<gatewayId>/<type>_<instance>/state      (retained)
//! bacnetwrite/<gatewayId>/<deviceId>/<type>_<instance>/<prop>/set    (subscribed)
//! bacnetwrite_status/<gatewayId>/<deviceId>/<type>_<instance>/<prop> (not retained)
//! bacnet2mqtt/<gatewayId>/bridge/state                               (retained, LWT)
//! ```
//!
//! # Architecture
//!
//! - [`store::ConfigStore`] - per-device descriptor files, the system
//!   of record for what gets polled
//! - [`driver::BacnetDriver`] - seam to the wire-level BACnet driver;
//!   [`sim::SimDriver`] is a built-in simulator
//! - [`transport::BacnetTransport`] - discovery, object enumeration,
//!   batched reads, single writes
//! - [`bridge::MqttBridge`] - the MQTT connection and topic translation
//! - [`scheduler::PollingScheduler`] - one cancellable poll job per device
//! - [`orchestrator::Orchestrator`] - wires configuration events and
//!   inbound commands together

pub mod bridge;
pub mod config;
pub mod driver;
pub mod orchestrator;
pub mod scheduler;
pub mod sim;
pub mod store;
pub mod transport;
