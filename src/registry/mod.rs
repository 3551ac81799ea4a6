//! Device registry: who may report, and the PIN-for-credential exchange.

pub mod credential;
pub mod pin;

use tracing::{debug, info};

use crate::{
    db::models::Device,
    error::{AuthError, EngineError},
    store::DeviceStore,
};

pub use pin::PinHasher;

/// Map a credential to its device. Read-only.
pub async fn resolve(store: &dyn DeviceStore, credential: Option<&str>) -> Result<Device, EngineError> {
    let credential = credential.ok_or(AuthError::Missing)?;
    match store.find_by_credential(credential).await? {
        Some(device) => Ok(device),
        None => {
            debug!("Report with unknown credential rejected");
            Err(AuthError::Unknown.into())
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PinExchange {
    Granted { token: String },
    Denied,
}

/// Exchange a whitelisted device's PIN for its bearer credential, creating
/// the device record with factory defaults on first contact.
pub async fn exchange_pin(
    store: &dyn DeviceStore,
    hasher: &PinHasher,
    device_id: &str,
    pin: &str,
) -> Result<PinExchange, EngineError> {
    let Some(allowed) = store.find_allowed(device_id).await? else {
        info!(device_id = %device_id, "PIN exchange for device not on allow-list");
        return Ok(PinExchange::Denied);
    };

    if !hasher.verify(device_id, pin, &allowed.pin_hash) {
        info!(device_id = %device_id, "PIN exchange with wrong PIN");
        return Ok(PinExchange::Denied);
    }

    let device = store.ensure_device(device_id, &credential::generate()).await?;
    info!(device_id = %device_id, "PIN exchange granted");
    Ok(PinExchange::Granted {
        token: device.credential,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDeviceStore;

    #[tokio::test]
    async fn resolve_requires_credential() {
        let store = MemoryDeviceStore::new();
        let err = resolve(&store, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Auth(AuthError::Missing)));
    }

    #[tokio::test]
    async fn resolve_rejects_unknown_credential() {
        let store = MemoryDeviceStore::new();
        let err = resolve(&store, Some("nope")).await.unwrap_err();
        assert!(matches!(err, EngineError::Auth(AuthError::Unknown)));
    }

    #[tokio::test]
    async fn resolve_finds_device() {
        let store = MemoryDeviceStore::new();
        store.insert_device(Device::with_defaults("dev1", "tok")).await;
        assert_eq!(resolve(&store, Some("tok")).await.unwrap().device_id, "dev1");
    }

    #[tokio::test]
    async fn pin_exchange_creates_device_and_returns_stable_token() {
        let store = MemoryDeviceStore::new();
        let hasher = PinHasher::new("secret");
        store
            .upsert_allowed("D1001", &hasher.hash("D1001", "1234"))
            .await
            .unwrap();

        let PinExchange::Granted { token } =
            exchange_pin(&store, &hasher, "D1001", "1234").await.unwrap()
        else {
            panic!("expected grant");
        };
        let again = exchange_pin(&store, &hasher, "D1001", "1234").await.unwrap();
        assert_eq!(again, PinExchange::Granted { token: token.clone() });

        let device = resolve(&store, Some(&token)).await.unwrap();
        assert_eq!(device.name, "New D1001");
    }

    #[tokio::test]
    async fn pin_exchange_denies_wrong_pin_and_unlisted_device() {
        let store = MemoryDeviceStore::new();
        let hasher = PinHasher::new("secret");
        store
            .upsert_allowed("D1001", &hasher.hash("D1001", "1234"))
            .await
            .unwrap();

        assert_eq!(
            exchange_pin(&store, &hasher, "D1001", "0000").await.unwrap(),
            PinExchange::Denied
        );
        assert_eq!(
            exchange_pin(&store, &hasher, "D9999", "1234").await.unwrap(),
            PinExchange::Denied
        );
        assert!(store.find_device("D1001").await.unwrap().is_none());
    }
}
