use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{DeviceStore, DeviceTx, StoreError};
use crate::db::models::{AllowedDevice, Device, Reading};

/// Process-local store with one async mutex per device.
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared across tasks.
#[derive(Clone, Default)]
pub struct MemoryDeviceStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    devices: RwLock<HashMap<String, Arc<Mutex<Device>>>>,
    credentials: RwLock<HashMap<String, String>>,
    allowed: RwLock<HashMap<String, AllowedDevice>>,
    readings: RwLock<Vec<Reading>>,
    fail_commits: AtomicBool,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a device record (operator-side provisioning).
    pub async fn insert_device(&self, device: Device) {
        self.inner
            .credentials
            .write()
            .await
            .insert(device.credential.clone(), device.device_id.clone());
        self.inner
            .devices
            .write()
            .await
            .insert(device.device_id.clone(), Arc::new(Mutex::new(device)));
    }

    /// All readings of one device in insertion order.
    pub async fn readings(&self, device_id: &str) -> Vec<Reading> {
        self.inner
            .readings
            .read()
            .await
            .iter()
            .filter(|r| r.device_id == device_id)
            .cloned()
            .collect()
    }

    /// Make every subsequent commit fail, simulating an unavailable backend.
    pub fn set_fail_commits(&self, fail: bool) {
        self.inner.fail_commits.store(fail, Ordering::SeqCst);
    }

    async fn entry(&self, device_id: &str) -> Option<Arc<Mutex<Device>>> {
        self.inner.devices.read().await.get(device_id).cloned()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn find_by_credential(&self, credential: &str) -> Result<Option<Device>, StoreError> {
        let device_id = self.inner.credentials.read().await.get(credential).cloned();
        match device_id {
            Some(id) => self.find_device(&id).await,
            None => Ok(None),
        }
    }

    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, StoreError> {
        match self.entry(device_id).await {
            Some(entry) => Ok(Some(entry.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn lock_device(&self, device_id: &str) -> Result<Option<Box<dyn DeviceTx>>, StoreError> {
        let Some(entry) = self.entry(device_id).await else {
            return Ok(None);
        };
        let guard = entry.lock_owned().await;
        let working = guard.clone();
        Ok(Some(Box::new(MemoryDeviceTx {
            guard: Some(guard),
            working,
            staged: Vec::new(),
            store: Arc::clone(&self.inner),
        })))
    }

    async fn latest_reading(&self, device_id: &str) -> Result<Option<Reading>, StoreError> {
        Ok(self
            .inner
            .readings
            .read()
            .await
            .iter()
            .filter(|r| r.device_id == device_id)
            .max_by_key(|r| r.recorded_at)
            .cloned())
    }

    async fn request_ota(&self, device_id: &str) -> Result<bool, StoreError> {
        match self.entry(device_id).await {
            Some(entry) => {
                entry.lock().await.ota_requested = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_stale_offline(
        &self,
        cutoff: DateTime<Utc>,
        device_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        let entries: Vec<_> = {
            let devices = self.inner.devices.read().await;
            devices
                .iter()
                .filter(|(id, _)| device_id.is_none_or(|wanted| wanted == id.as_str()))
                .map(|(_, entry)| Arc::clone(entry))
                .collect()
        };

        let mut changed = 0;
        for entry in entries {
            let mut device = entry.lock().await;
            let stale = device.last_seen.is_none_or(|seen| seen < cutoff);
            if device.online && stale {
                device.online = false;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn find_allowed(&self, device_id: &str) -> Result<Option<AllowedDevice>, StoreError> {
        Ok(self.inner.allowed.read().await.get(device_id).cloned())
    }

    async fn upsert_allowed(&self, device_id: &str, pin_hash: &str) -> Result<(), StoreError> {
        self.inner.allowed.write().await.insert(
            device_id.to_owned(),
            AllowedDevice {
                device_id: device_id.to_owned(),
                pin_hash: pin_hash.to_owned(),
            },
        );
        Ok(())
    }

    async fn ensure_device(&self, device_id: &str, credential: &str) -> Result<Device, StoreError> {
        // the map lock is released before waiting on any device mutex
        let (entry, created) = {
            let mut devices = self.inner.devices.write().await;
            match devices.get(device_id) {
                Some(entry) => (Arc::clone(entry), false),
                None => {
                    let entry = Arc::new(Mutex::new(Device::with_defaults(device_id, credential)));
                    devices.insert(device_id.to_owned(), Arc::clone(&entry));
                    (entry, true)
                }
            }
        };

        if created {
            self.inner
                .credentials
                .write()
                .await
                .insert(credential.to_owned(), device_id.to_owned());
        }
        let device = entry.lock().await.clone();
        Ok(device)
    }
}

struct MemoryDeviceTx {
    guard: Option<OwnedMutexGuard<Device>>,
    working: Device,
    staged: Vec<Reading>,
    store: Arc<Inner>,
}

#[async_trait]
impl DeviceTx for MemoryDeviceTx {
    fn device_mut(&mut self) -> &mut Device {
        &mut self.working
    }

    async fn append_reading(&mut self, reading: &Reading) -> Result<(), StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::Finished);
        }
        self.staged.push(reading.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if self.store.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit rejected".to_owned()));
        }
        let mut guard = self.guard.take().ok_or(StoreError::Finished)?;

        // Only live fields are written back; configuration stays operator-owned.
        let w = &self.working;
        guard.last_seen = w.last_seen;
        guard.online = w.online;
        guard.reported_heater = w.reported_heater;
        guard.reported_mist = w.reported_mist;
        guard.reported_light = w.reported_light;
        guard.last_alert_sent = guard.last_alert_sent.max(w.last_alert_sent);
        guard.ota_requested = w.ota_requested;

        self.store
            .readings
            .write()
            .await
            .extend(self.staged.drain(..));
        Ok(())
    }
}
