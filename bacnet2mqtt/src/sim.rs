//! Simulated BACnet network for running without field hardware.
//!
//! Backs the binary's default driver selection and integration-style
//! tests: a fixed set of devices with a few analog and binary objects
//! whose present values drift deterministically between reads.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use bacnet2mqtt_common::{ApplicationTag, ObjectId, Value};

use crate::driver::{BacnetDriver, DeviceFound, ReadResult, TransportError};

/// One simulated device.
struct SimDevice {
    device_id: String,
    objects: Vec<ObjectId>,
    /// Writes land here and are reflected by subsequent reads.
    written: HashMap<(ObjectId, u32), Value>,
    /// Monotonic read counter driving value drift.
    reads: u64,
}

/// In-memory driver simulating a small BACnet network.
pub struct SimDriver {
    devices: Mutex<HashMap<String, SimDevice>>,
}

impl SimDriver {
    /// A simulator with two devices: one mixed analog/binary device
    /// and one analog-only device.
    pub fn new() -> Self {
        let mut devices = HashMap::new();
        devices.insert(
            "192.168.1.114".to_string(),
            SimDevice {
                device_id: "114".to_string(),
                objects: vec![
                    ObjectId::new(0, 1),
                    ObjectId::new(2, 202),
                    ObjectId::new(3, 1),
                ],
                written: HashMap::new(),
                reads: 0,
            },
        );
        devices.insert(
            "192.168.1.115".to_string(),
            SimDevice {
                device_id: "115".to_string(),
                objects: vec![ObjectId::new(0, 1), ObjectId::new(0, 2)],
                written: HashMap::new(),
                reads: 0,
            },
        );

        Self {
            devices: Mutex::new(devices),
        }
    }

    fn with_device<T>(
        &self,
        address: &str,
        f: impl FnOnce(&mut SimDevice) -> T,
    ) -> Result<T, TransportError> {
        let mut devices = self
            .devices
            .lock()
            .map_err(|_| TransportError::Driver("simulator state poisoned".to_string()))?;

        devices
            .get_mut(address)
            .map(f)
            .ok_or_else(|| TransportError::Timeout)
    }

    fn present_value(device: &SimDevice, object: &ObjectId) -> Value {
        if let Some(v) = device.written.get(&(*object, 85)) {
            return v.clone();
        }

        match object.object_type {
            // binary kinds toggle every other read
            3 | 4 | 5 => Value::Bool(device.reads % 2 == 0),
            _ => {
                let base = (object.object_type as u64 * 10 + object.instance as u64) as f64;
                Value::Real(base + (device.reads % 10) as f64 / 10.0)
            }
        }
    }
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BacnetDriver for SimDriver {
    async fn who_is(&self) -> Result<mpsc::Receiver<DeviceFound>, TransportError> {
        let found: Vec<DeviceFound> = {
            let devices = self
                .devices
                .lock()
                .map_err(|_| TransportError::Driver("simulator state poisoned".to_string()))?;
            devices
                .iter()
                .map(|(address, d)| DeviceFound {
                    device_id: d.device_id.clone(),
                    address: address.clone(),
                })
                .collect()
        };

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for device in found {
                // Simulated devices answer twice, like a chatty segment.
                if tx.send(device.clone()).await.is_err() {
                    return;
                }
                if tx.send(device).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }

    async fn read_object_list(&self, address: &str) -> Result<Vec<ObjectId>, TransportError> {
        self.with_device(address, |d| d.objects.clone())
    }

    async fn read_present_values(
        &self,
        address: &str,
        objects: &[ObjectId],
    ) -> Result<Vec<ReadResult>, TransportError> {
        self.with_device(address, |d| {
            d.reads += 1;
            objects
                .iter()
                .map(|object| {
                    if d.objects.contains(object) {
                        (*object, Ok(Self::present_value(d, object)))
                    } else {
                        (*object, Err("unknown-object".to_string()))
                    }
                })
                .collect()
        })
    }

    async fn write_property(
        &self,
        address: &str,
        object: ObjectId,
        property_id: u32,
        value: &Value,
        _tag: ApplicationTag,
        _priority: Option<u8>,
    ) -> Result<(), TransportError> {
        self.with_device(address, |d| {
            if !d.objects.contains(&object) {
                return Err(TransportError::Rejected(format!(
                    "unknown object {}",
                    object
                )));
            }
            d.written.insert((object, property_id), value.clone());
            Ok(())
        })?
    }
}
