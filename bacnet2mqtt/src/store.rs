//! File-backed device configuration store.
//!
//! One JSON descriptor file per device, named `<deviceId>.json`.
//! Files whose name starts with `_` are deactivated and skipped during
//! load. Each file is parsed independently: a malformed file is logged
//! and skipped, it never aborts loading of the others.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DeviceDescriptor;

/// Prefix marking a descriptor file as deactivated.
const DISABLED_PREFIX: &str = "_";

/// Errors from the config store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No configuration for device '{0}'")]
    NotFound(String),
    #[error("Invalid device id '{0}'")]
    InvalidDeviceId(String),
    #[error("Invalid descriptor: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Directory-backed registry of device descriptors; the system of
/// record for which devices and objects are polled.
#[derive(Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Open a store over the given directory, creating it if missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The directory backing this store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the descriptor file for a device id.
    ///
    /// Device ids come in over external surfaces, so anything that
    /// could make the file name escape the store directory is
    /// rejected before the path is built.
    fn file_path(&self, device_id: &str) -> Result<PathBuf, StoreError> {
        if device_id.is_empty() || device_id.contains(['/', '\\']) || device_id.contains("..") {
            return Err(StoreError::InvalidDeviceId(device_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", device_id)))
    }

    /// Load every active descriptor, sending each on `events` as soon
    /// as it parses. Files arrive in arbitrary order; consumers apply
    /// each event independently.
    ///
    /// Returns the number of descriptors emitted. A single bad file is
    /// logged and skipped, never failing the load.
    pub async fn load(
        &self,
        events: &mpsc::Sender<DeviceDescriptor>,
    ) -> Result<usize, StoreError> {
        let mut emitted = 0;

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(DISABLED_PREFIX) {
                info!(file = %name, "Skipping deactivated device config");
                continue;
            }

            match Self::read_descriptor(&path) {
                Ok(descriptor) => {
                    debug!(
                        device_id = %descriptor.device.device_id,
                        file = %name,
                        "Loaded device config"
                    );
                    if events.send(descriptor).await.is_err() {
                        // Consumer gone; nothing left to load for.
                        break;
                    }
                    emitted += 1;
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "Failed to parse device config, skipping");
                }
            }
        }

        Ok(emitted)
    }

    fn read_descriptor(path: &Path) -> Result<DeviceDescriptor, StoreError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the descriptor to `<deviceId>.json`, pretty-printed.
    /// Idempotent: re-saving the same device id overwrites.
    pub fn save(&self, descriptor: &DeviceDescriptor) -> Result<PathBuf, StoreError> {
        let path = self.file_path(&descriptor.device.device_id)?;
        let content = serde_json::to_string_pretty(descriptor)?;
        std::fs::write(&path, content)?;

        info!(device_id = %descriptor.device.device_id, path = %path.display(), "Saved device config");
        Ok(path)
    }

    /// Remove the descriptor file for a device id.
    pub fn delete(&self, device_id: &str) -> Result<(), StoreError> {
        let path = self.file_path(device_id)?;

        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(device_id = %device_id, "Deleted device config");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(device_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceInfo, ObjectEntry, PollingConfig};
    use bacnet2mqtt_common::ObjectId;

    fn descriptor(device_id: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            device: DeviceInfo {
                device_id: device_id.to_string(),
                address: "192.168.1.114".to_string(),
            },
            polling: PollingConfig {
                schedule: "*/15 * * * * *".to_string(),
            },
            objects: vec![ObjectEntry {
                object_id: ObjectId::new(2, 202),
            }],
        }
    }

    #[tokio::test]
    async fn test_save_then_load_emits_event() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();

        store.save(&descriptor("114")).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let emitted = store.load(&tx).await.unwrap();
        drop(tx);

        assert_eq!(emitted, 1);
        let loaded = rx.recv().await.unwrap();
        assert_eq!(loaded, descriptor("114"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_load_skips_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();

        store.save(&descriptor("114")).unwrap();
        std::fs::write(dir.path().join("garbage.json"), "{ not json").unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let emitted = store.load(&tx).await.unwrap();
        drop(tx);

        assert_eq!(emitted, 1);
        assert_eq!(rx.recv().await.unwrap().device.device_id, "114");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_load_skips_deactivated_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();

        let disabled = serde_json::to_string_pretty(&descriptor("99")).unwrap();
        std::fs::write(dir.path().join("_99.json"), disabled).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a descriptor").unwrap();

        let (tx, _rx) = mpsc::channel(8);
        let emitted = store.load(&tx).await.unwrap();

        assert_eq!(emitted, 0);
    }

    #[tokio::test]
    async fn test_save_overwrites_same_device_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();

        store.save(&descriptor("114")).unwrap();

        let mut updated = descriptor("114");
        updated.polling.schedule = "0 * * * * *".to_string();
        store.save(&updated).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let emitted = store.load(&tx).await.unwrap();
        drop(tx);

        assert_eq!(emitted, 1);
        assert_eq!(rx.recv().await.unwrap().polling.schedule, "0 * * * * *");
    }

    #[test]
    fn test_rejects_path_escaping_device_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("devices")).unwrap();

        for id in ["../escape", "a/b", r"a\b", "..", ""] {
            let mut bad = descriptor("114");
            bad.device.device_id = id.to_string();
            assert!(
                matches!(store.save(&bad), Err(StoreError::InvalidDeviceId(_))),
                "id {:?} must be rejected",
                id
            );
            assert!(matches!(
                store.delete(id),
                Err(StoreError::InvalidDeviceId(_))
            ));
        }

        // Nothing may have been written next to the store directory.
        assert!(!dir.path().join("escape.json").exists());
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();

        store.save(&descriptor("114")).unwrap();
        store.delete("114").unwrap();
        assert!(!dir.path().join("114.json").exists());

        assert!(matches!(
            store.delete("114"),
            Err(StoreError::NotFound(id)) if id == "114"
        ));
    }
}
