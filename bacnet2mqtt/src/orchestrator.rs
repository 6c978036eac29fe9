//! Wiring between the config store, the scheduler, the field
//! transport and the MQTT bridge.
//!
//! Owns the device registry (device id -> descriptor). The registry is
//! mutated synchronously before any dependent schedule operation is
//! issued, so the write path always observes the result of the latest
//! save or delete.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use bacnet2mqtt_common::{ObjectId, WriteCommand, WriteStatus};

use crate::bridge::MqttBridge;
use crate::config::{DeviceDescriptor, DeviceInfo};
use crate::driver::{DeviceFound, TransportError};
use crate::scheduler::PollingScheduler;
use crate::store::{ConfigStore, StoreError};
use crate::transport::BacnetTransport;

/// The gateway's control plane.
pub struct Orchestrator {
    registry: HashMap<String, DeviceDescriptor>,
    scheduler: PollingScheduler,
    store: ConfigStore,
    transport: Arc<BacnetTransport>,
    bridge: Arc<MqttBridge>,
}

impl Orchestrator {
    pub fn new(
        store: ConfigStore,
        transport: Arc<BacnetTransport>,
        bridge: Arc<MqttBridge>,
    ) -> Self {
        Self {
            registry: HashMap::new(),
            scheduler: PollingScheduler::new(),
            store,
            transport,
            bridge,
        }
    }

    /// Number of registered devices.
    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether a device has an active poll job.
    pub fn is_polling(&self, device_id: &str) -> bool {
        self.scheduler.is_polling(device_id)
    }

    /// Apply a loaded or saved descriptor: register it, then replace
    /// the device's poll job. Idempotent per device id; events may
    /// arrive in any order across devices.
    pub fn apply_config(&mut self, descriptor: DeviceDescriptor) {
        let device_id = descriptor.device.device_id.clone();
        self.registry.insert(device_id.clone(), descriptor.clone());

        if let Err(e) = self.scheduler.start_polling(
            &descriptor,
            self.transport.clone(),
            self.bridge.clone(),
        ) {
            error!(device_id = %device_id, error = %e, "Device registered but not polled");
        }
    }

    /// Persist a descriptor, then apply it.
    pub fn save_config(&mut self, descriptor: DeviceDescriptor) -> Result<(), StoreError> {
        self.store.save(&descriptor)?;
        self.apply_config(descriptor);
        Ok(())
    }

    /// Delete a device's configuration and tear down its poll job.
    pub fn remove_device(&mut self, device_id: &str) -> Result<(), StoreError> {
        self.store.delete(device_id)?;
        self.registry.remove(device_id);
        self.scheduler.stop(device_id);
        Ok(())
    }

    /// Broadcast discovery; the token lets a caller settle the scan
    /// early with partial results.
    pub async fn scan_for_devices(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<DeviceFound>, TransportError> {
        self.transport.discover(cancel).await
    }

    /// Enumerate a device's objects.
    pub async fn scan_device(&self, device: &DeviceInfo) -> Result<Vec<ObjectId>, TransportError> {
        self.transport.scan_device(device).await
    }

    /// Dispatch one decoded write command and publish its outcome.
    ///
    /// Failures end up in the published status; nothing here can take
    /// the command loop down.
    pub async fn handle_write(&self, command: WriteCommand) {
        let status = match self.registry.get(&command.device_id) {
            Some(descriptor) => {
                match self
                    .transport
                    .write_property(
                        &descriptor.device.address,
                        command.object,
                        command.property_id,
                        &command.value,
                        command.priority,
                        command.application_tag,
                    )
                    .await
                {
                    Ok(()) => {
                        info!(
                            device_id = %command.device_id,
                            object = %command.object,
                            property_id = command.property_id,
                            "Write acknowledged"
                        );
                        WriteStatus::success("write acknowledged")
                    }
                    Err(e) => {
                        warn!(device_id = %command.device_id, error = %e, "Write failed");
                        WriteStatus::error(e.to_string())
                    }
                }
            }
            None => {
                warn!(device_id = %command.device_id, "Write for unconfigured device");
                WriteStatus::error(format!("unknown device '{}'", command.device_id))
            }
        };

        if let Err(e) = self
            .bridge
            .publish_write_status(
                &command.device_id,
                &command.object,
                command.property_id,
                &status,
            )
            .await
        {
            warn!(device_id = %command.device_id, error = %e, "Failed to publish write status");
        }
    }

    /// Load every stored descriptor and start polling as each arrives.
    pub async fn load_stored_configs(&mut self) -> Result<usize, StoreError> {
        let (tx, mut rx) = mpsc::channel(16);

        // The store sends each descriptor as soon as it parses; apply
        // them incrementally rather than waiting for the full load.
        let store = self.store.clone();
        let load = tokio::spawn(async move { store.load(&tx).await });

        while let Some(descriptor) = rx.recv().await {
            self.apply_config(descriptor);
        }

        let loaded = match load.await {
            Ok(result) => result?,
            Err(e) => return Err(StoreError::Io(std::io::Error::other(e.to_string()))),
        };

        info!(devices = loaded, "Device configs loaded");
        Ok(loaded)
    }

    /// Run the control loop until the command channel closes or the
    /// token is cancelled. Tears down every poll job on the way out.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<WriteCommand>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutting down orchestrator");
                    break;
                }
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_write(command).await,
                        None => {
                            info!("Command channel closed, shutting down orchestrator");
                            break;
                        }
                    }
                }
            }
        }

        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rumqttc::QoS;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::bridge::{BridgeError, MqttPublish};
    use crate::config::{ObjectEntry, PollingConfig};
    use crate::sim::SimDriver;
    use bacnet2mqtt_common::Value;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MqttPublish for RecordingPublisher {
        async fn publish(
            &self,
            topic: &str,
            _qos: QoS,
            _retain: bool,
            payload: Vec<u8>,
        ) -> Result<(), BridgeError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), String::from_utf8(payload).unwrap()));
            Ok(())
        }
    }

    fn descriptor(device_id: &str, schedule: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            device: DeviceInfo {
                device_id: device_id.to_string(),
                address: format!("192.168.1.{}", device_id),
            },
            polling: PollingConfig {
                schedule: schedule.to_string(),
            },
            objects: vec![ObjectEntry {
                object_id: ObjectId::new(2, 202),
            }],
        }
    }

    fn orchestrator(dir: &std::path::Path) -> (Orchestrator, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        let bridge = Arc::new(MqttBridge::with_publisher("test-gw", publisher.clone()));
        let transport = Arc::new(BacnetTransport::new(
            Arc::new(SimDriver::new()),
            Duration::from_secs(1),
        ));
        let store = ConfigStore::open(dir).unwrap();

        (Orchestrator::new(store, transport, bridge), publisher)
    }

    #[tokio::test]
    async fn test_apply_config_replaces_descriptor_and_job() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orchestrator, _) = orchestrator(dir.path());

        orchestrator.apply_config(descriptor("114", "0 0 * * * *"));
        orchestrator.apply_config(descriptor("114", "0 30 * * * *"));

        assert_eq!(orchestrator.device_count(), 1);
        assert!(orchestrator.is_polling("114"));
        assert_eq!(
            orchestrator.registry.get("114").unwrap().polling.schedule,
            "0 30 * * * *"
        );
    }

    #[tokio::test]
    async fn test_save_config_persists_and_polls() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orchestrator, _) = orchestrator(dir.path());

        orchestrator
            .save_config(descriptor("114", "0 0 * * * *"))
            .unwrap();

        assert!(dir.path().join("114.json").exists());
        assert!(orchestrator.is_polling("114"));
    }

    #[tokio::test]
    async fn test_remove_device_tears_down() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orchestrator, _) = orchestrator(dir.path());

        orchestrator
            .save_config(descriptor("114", "0 0 * * * *"))
            .unwrap();
        orchestrator.remove_device("114").unwrap();

        assert_eq!(orchestrator.device_count(), 0);
        assert!(!orchestrator.is_polling("114"));
        assert!(matches!(
            orchestrator.remove_device("114"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_stored_configs_starts_polling() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ConfigStore::open(dir.path()).unwrap();
            store.save(&descriptor("114", "0 0 * * * *")).unwrap();
            store.save(&descriptor("115", "0 0 * * * *")).unwrap();
        }

        let (mut orchestrator, _) = orchestrator(dir.path());
        let loaded = orchestrator.load_stored_configs().await.unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(orchestrator.device_count(), 2);
        assert!(orchestrator.is_polling("114"));
        assert!(orchestrator.is_polling("115"));
    }

    #[tokio::test]
    async fn test_write_to_known_device_publishes_success() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orchestrator, publisher) = orchestrator(dir.path());

        orchestrator.apply_config(descriptor("114", "0 0 * * * *"));
        orchestrator
            .handle_write(WriteCommand {
                device_id: "114".to_string(),
                object: ObjectId::new(2, 202),
                property_id: 85,
                value: Value::Real(42.0),
                priority: Some(8),
                application_tag: None,
            })
            .await;

        let published = publisher.published.lock().unwrap();
        let (topic, payload) = published.last().unwrap();
        assert_eq!(topic, "bacnetwrite_status/test-gw/114/2_202/85");
        assert!(payload.contains("\"status\":\"success\""));
    }

    #[tokio::test]
    async fn test_write_to_unknown_device_publishes_error() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, publisher) = orchestrator(dir.path());

        orchestrator
            .handle_write(WriteCommand {
                device_id: "999".to_string(),
                object: ObjectId::new(1, 0),
                property_id: 85,
                value: Value::Unsigned(1),
                priority: None,
                application_tag: None,
            })
            .await;

        let published = publisher.published.lock().unwrap();
        let (topic, payload) = published.last().unwrap();
        assert_eq!(topic, "bacnetwrite_status/test-gw/999/1_0/85");
        assert!(payload.contains("\"status\":\"error\""));
        assert!(payload.contains("unknown device"));
    }

    #[tokio::test]
    async fn test_rejected_write_publishes_error_detail() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orchestrator, publisher) = orchestrator(dir.path());

        orchestrator.apply_config(descriptor("114", "0 0 * * * *"));
        orchestrator
            .handle_write(WriteCommand {
                device_id: "114".to_string(),
                // Not an object the simulated device exposes.
                object: ObjectId::new(9, 9),
                property_id: 85,
                value: Value::Unsigned(1),
                priority: None,
                application_tag: None,
            })
            .await;

        let published = publisher.published.lock().unwrap();
        let (_, payload) = published.last().unwrap();
        assert!(payload.contains("\"status\":\"error\""));
        assert!(payload.contains("unknown object"));
    }
}
