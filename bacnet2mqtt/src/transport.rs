//! Field transport: discovery, object enumeration, batched reads and
//! single writes on top of a [`BacnetDriver`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use bacnet2mqtt_common::{ApplicationTag, ObjectId, Value};

use crate::config::DeviceInfo;
use crate::driver::{BacnetDriver, DeviceFound, TransportError};

/// All interaction with field devices goes through this type.
///
/// Holds no per-call state: each operation is a one-shot request that
/// fails closed on timeout. Nothing here retries; callers own retry
/// policy.
pub struct BacnetTransport {
    driver: Arc<dyn BacnetDriver>,
    discovery_window: Duration,
}

impl BacnetTransport {
    pub fn new(driver: Arc<dyn BacnetDriver>, discovery_window: Duration) -> Self {
        Self {
            driver,
            discovery_window,
        }
    }

    /// Broadcast discovery and collect responses for the configured
    /// window, deduplicated by device id.
    ///
    /// Cancelling the token settles the call immediately with whatever
    /// was collected so far rather than waiting out the window.
    pub async fn discover(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<DeviceFound>, TransportError> {
        let mut responses = self.driver.who_is().await?;

        let mut found = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let window = tokio::time::sleep(self.discovery_window);
        tokio::pin!(window);

        loop {
            tokio::select! {
                _ = &mut window => break,
                _ = cancel.cancelled() => {
                    debug!(collected = found.len(), "Discovery cancelled, returning partial result");
                    break;
                }
                response = responses.recv() => {
                    match response {
                        Some(device) => {
                            if seen.insert(device.device_id.clone()) {
                                debug!(device_id = %device.device_id, address = %device.address, "Device found");
                                found.push(device);
                            }
                        }
                        // Driver closed the response stream early.
                        None => break,
                    }
                }
            }
        }

        Ok(found)
    }

    /// Read the device's object list in a single request.
    ///
    /// Fails fast on any transport error, surfacing the raw cause; the
    /// caller decides whether to retry.
    pub async fn scan_device(&self, device: &DeviceInfo) -> Result<Vec<ObjectId>, TransportError> {
        self.driver.read_object_list(&device.address).await
    }

    /// One batched present-value read.
    ///
    /// Per-object failures do not void the batch: a failed object is
    /// logged and simply absent from the returned `objectKey -> value`
    /// mapping, maximizing partial telemetry delivery.
    pub async fn read_values(
        &self,
        device: &DeviceInfo,
        objects: &[ObjectId],
    ) -> Result<HashMap<String, Value>, TransportError> {
        let results = self
            .driver
            .read_present_values(&device.address, objects)
            .await?;

        let mut values = HashMap::new();
        for (object, result) in results {
            match result {
                Ok(value) => {
                    values.insert(object.key(), value);
                }
                Err(e) => {
                    warn!(
                        device_id = %device.device_id,
                        object = %object,
                        error = %e,
                        "Object read failed within batch"
                    );
                }
            }
        }

        Ok(values)
    }

    /// Issue a single property write.
    ///
    /// `tag` is used verbatim when supplied; otherwise the value's
    /// primitive kind is mapped through [`ApplicationTag::infer`].
    pub async fn write_property(
        &self,
        address: &str,
        object: ObjectId,
        property_id: u32,
        value: &Value,
        priority: Option<u8>,
        tag: Option<ApplicationTag>,
    ) -> Result<(), TransportError> {
        let tag = tag.unwrap_or_else(|| ApplicationTag::infer(value));

        self.driver
            .write_property(address, object, property_id, value, tag, priority)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    use crate::driver::ReadResult;

    /// Scripted driver recording calls and replaying canned results.
    struct ScriptedDriver {
        object_list: Result<Vec<ObjectId>, String>,
        reads: Vec<ReadResult>,
        writes: Mutex<Vec<(ObjectId, u32, Value, ApplicationTag, Option<u8>)>>,
        /// Delay between streamed discovery responses.
        response_gap: Duration,
        responses: Vec<DeviceFound>,
    }

    impl ScriptedDriver {
        fn new() -> Self {
            Self {
                object_list: Ok(vec![]),
                reads: vec![],
                writes: Mutex::new(vec![]),
                response_gap: Duration::ZERO,
                responses: vec![],
            }
        }
    }

    #[async_trait]
    impl BacnetDriver for ScriptedDriver {
        async fn who_is(&self) -> Result<mpsc::Receiver<DeviceFound>, TransportError> {
            let (tx, rx) = mpsc::channel(16);
            let responses = self.responses.clone();
            let gap = self.response_gap;
            tokio::spawn(async move {
                for response in responses {
                    if tx.send(response).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(gap).await;
                }
                // Keep the stream open past the last response, like a
                // quiet network segment.
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
            Ok(rx)
        }

        async fn read_object_list(&self, _address: &str) -> Result<Vec<ObjectId>, TransportError> {
            self.object_list
                .clone()
                .map_err(TransportError::Rejected)
        }

        async fn read_present_values(
            &self,
            _address: &str,
            _objects: &[ObjectId],
        ) -> Result<Vec<ReadResult>, TransportError> {
            Ok(self.reads.clone())
        }

        async fn write_property(
            &self,
            _address: &str,
            object: ObjectId,
            property_id: u32,
            value: &Value,
            tag: ApplicationTag,
            priority: Option<u8>,
        ) -> Result<(), TransportError> {
            self.writes
                .lock()
                .unwrap()
                .push((object, property_id, value.clone(), tag, priority));
            Ok(())
        }
    }

    fn device() -> DeviceInfo {
        DeviceInfo {
            device_id: "114".to_string(),
            address: "192.168.1.114".to_string(),
        }
    }

    fn transport(driver: ScriptedDriver) -> BacnetTransport {
        BacnetTransport::new(Arc::new(driver), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_discover_dedups_responses() {
        let mut driver = ScriptedDriver::new();
        let a = DeviceFound {
            device_id: "114".to_string(),
            address: "192.168.1.114".to_string(),
        };
        let b = DeviceFound {
            device_id: "115".to_string(),
            address: "192.168.1.115".to_string(),
        };
        driver.responses = vec![a.clone(), a.clone(), b.clone()];

        let found = transport(driver)
            .discover(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(found, vec![a, b]);
    }

    #[tokio::test]
    async fn test_cancel_resolves_with_partial_result() {
        let mut driver = ScriptedDriver::new();
        driver.responses = vec![
            DeviceFound {
                device_id: "114".to_string(),
                address: "192.168.1.114".to_string(),
            },
            DeviceFound {
                device_id: "115".to_string(),
                address: "192.168.1.115".to_string(),
            },
        ];
        // Second response only arrives long after cancellation.
        driver.response_gap = Duration::from_secs(30);

        let transport = BacnetTransport::new(Arc::new(driver), Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let found = tokio::time::timeout(Duration::from_secs(5), transport.discover(&cancel))
            .await
            .expect("discover must settle promptly on cancel")
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].device_id, "114");
    }

    #[tokio::test]
    async fn test_scan_device_surfaces_raw_error() {
        let mut driver = ScriptedDriver::new();
        driver.object_list = Err("segmentation-not-supported".to_string());

        let err = transport(driver).scan_device(&device()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Device rejected request: segmentation-not-supported"
        );
    }

    #[tokio::test]
    async fn test_read_values_drops_failed_objects() {
        let mut driver = ScriptedDriver::new();
        driver.reads = vec![
            (ObjectId::new(2, 202), Ok(Value::Real(21.5))),
            (ObjectId::new(3, 1), Err("unknown-object".to_string())),
        ];

        let values = transport(driver)
            .read_values(&device(), &[ObjectId::new(2, 202), ObjectId::new(3, 1)])
            .await
            .unwrap();

        assert_eq!(values.len(), 1);
        assert_eq!(values.get("2_202"), Some(&Value::Real(21.5)));
        assert!(!values.contains_key("3_1"));
    }

    #[tokio::test]
    async fn test_write_property_infers_tag() {
        let driver = ScriptedDriver::new();
        let writes = Arc::new(driver);
        let transport = BacnetTransport::new(writes.clone(), Duration::from_secs(1));

        transport
            .write_property(
                "192.168.1.114",
                ObjectId::new(1, 0),
                85,
                &Value::Unsigned(1),
                Some(8),
                None,
            )
            .await
            .unwrap();

        transport
            .write_property(
                "192.168.1.114",
                ObjectId::new(1, 0),
                85,
                &Value::Unsigned(1),
                None,
                Some(ApplicationTag::Enumerated),
            )
            .await
            .unwrap();

        let recorded = writes.writes.lock().unwrap();
        assert_eq!(recorded[0].3, ApplicationTag::UnsignedInt);
        assert_eq!(recorded[0].4, Some(8));
        assert_eq!(recorded[1].3, ApplicationTag::Enumerated);
        assert_eq!(recorded[1].4, None);
    }
}
