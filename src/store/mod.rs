//! Device registry and telemetry persistence.
//!
//! All live-state writes for a device go through a [`DeviceTx`], which holds
//! that device's exclusive lock from [`DeviceStore::lock_device`] until it is
//! committed or dropped. Dropping without `commit` discards every staged
//! write.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::models::{AllowedDevice, Device, Reading};

pub use memory::MemoryDeviceStore;
pub use postgres::PgDeviceStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("transaction already finished")]
    Finished,
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Registry lookup by bearer credential.
    async fn find_by_credential(&self, credential: &str) -> Result<Option<Device>, StoreError>;

    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, StoreError>;

    /// Open a unit of work holding the device's exclusive lock.
    /// `None` when the device does not exist.
    async fn lock_device(&self, device_id: &str) -> Result<Option<Box<dyn DeviceTx>>, StoreError>;

    async fn latest_reading(&self, device_id: &str) -> Result<Option<Reading>, StoreError>;

    /// Flag a pending OTA update. Returns `false` for an unknown device.
    async fn request_ota(&self, device_id: &str) -> Result<bool, StoreError>;

    /// Flip `online` to false for devices not seen since `cutoff`, optionally
    /// restricted to one device. Returns the number of devices changed.
    async fn mark_stale_offline(
        &self,
        cutoff: DateTime<Utc>,
        device_id: Option<&str>,
    ) -> Result<u64, StoreError>;

    async fn find_allowed(&self, device_id: &str) -> Result<Option<AllowedDevice>, StoreError>;

    async fn upsert_allowed(&self, device_id: &str, pin_hash: &str) -> Result<(), StoreError>;

    /// Fetch the device, creating it with factory defaults and `credential`
    /// when it does not exist yet.
    async fn ensure_device(&self, device_id: &str, credential: &str) -> Result<Device, StoreError>;
}

/// One locked report cycle for a single device.
#[async_trait]
pub trait DeviceTx: Send {
    fn device_mut(&mut self) -> &mut Device;

    async fn append_reading(&mut self, reading: &Reading) -> Result<(), StoreError>;

    /// Persist the staged reading(s) and the device's live fields atomically.
    async fn commit(&mut self) -> Result<(), StoreError>;
}
