//! Two-phase OTA handshake.
//!
//! An operator flips `ota_requested` to `true`; the next report from that
//! device consumes it. Callers must hold the device's lock for the whole
//! report cycle so the read and the clear land in the same commit.

use tracing::info;

use crate::{
    db::models::Device,
    store::{DeviceStore, StoreError},
};

/// Consume a pending OTA request. Returns `true` exactly once per request.
pub fn take_request(device: &mut Device) -> bool {
    std::mem::replace(&mut device.ota_requested, false)
}

/// Operator side of the handshake: mark an update as pending.
/// Returns `false` when the device does not exist.
pub async fn request(store: &dyn DeviceStore, device_id: &str) -> Result<bool, StoreError> {
    let found = store.request_ota(device_id).await?;
    if found {
        info!(device_id = %device_id, "OTA update requested");
    }
    Ok(found)
}
