//! Seam to the wire-level BACnet driver.
//!
//! The gateway never encodes BACnet frames itself; everything below
//! the service level (Who-Is/I-Am, ReadProperty, ReadPropertyMultiple,
//! WriteProperty) is delegated to a [`BacnetDriver`] implementation.
//! The built-in [`crate::sim::SimDriver`] backs the binary and tests;
//! hardware drivers plug in through this trait.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use bacnet2mqtt_common::{ApplicationTag, ObjectId, Value};

/// Transport-level failure of a single field-protocol request.
///
/// Never retried internally; the caller decides whether to retry.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("Device rejected request: {0}")]
    Rejected(String),
    #[error("Driver error: {0}")]
    Driver(String),
}

/// A device answering a discovery broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFound {
    pub device_id: String,
    pub address: String,
}

/// Per-object outcome of a batched read.
pub type ReadResult = (ObjectId, Result<Value, String>);

/// Driver capability the transport is built on.
///
/// Each call is a one-shot asynchronous request with a bounded wait;
/// implementations fail closed on timeout.
#[async_trait]
pub trait BacnetDriver: Send + Sync {
    /// Broadcast a Who-Is and stream I-Am responses for as long as the
    /// receiver is held open. Duplicate responses may appear; the
    /// caller deduplicates.
    async fn who_is(&self) -> Result<mpsc::Receiver<DeviceFound>, TransportError>;

    /// Read the device object's object list in a single request.
    async fn read_object_list(&self, address: &str) -> Result<Vec<ObjectId>, TransportError>;

    /// One batched present-value read for all given objects.
    ///
    /// Returns an explicit per-object success/failure pair for every
    /// requested object; an `Err` return voids the whole batch and is
    /// reserved for transport-level failures.
    async fn read_present_values(
        &self,
        address: &str,
        objects: &[ObjectId],
    ) -> Result<Vec<ReadResult>, TransportError>;

    /// Write one property at the given priority (driver default when
    /// `priority` is `None`), with the value typed by `tag`.
    async fn write_property(
        &self,
        address: &str,
        object: ObjectId,
        property_id: u32,
        value: &Value,
        tag: ApplicationTag,
        priority: Option<u8>,
    ) -> Result<(), TransportError>;
}
