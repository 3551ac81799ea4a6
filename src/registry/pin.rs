use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Keyed hash for device PINs stored in `allowed_devices.pin_hash`.
///
/// The device id is part of the MAC input, so equal PINs on different
/// devices never share a hash.
#[derive(Clone)]
pub struct PinHasher {
    key: Arc<[u8]>,
}

impl PinHasher {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Arc::from(secret.as_bytes()),
        }
    }

    fn mac(&self, device_id: &str, pin: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(device_id.as_bytes());
        mac.update(b":");
        mac.update(pin.as_bytes());
        mac
    }

    /// Lowercase hex HMAC-SHA256 of `device_id:pin`.
    pub fn hash(&self, device_id: &str, pin: &str) -> String {
        hex::encode(self.mac(device_id, pin).finalize().into_bytes())
    }

    /// Constant-time comparison against a stored hex hash.
    pub fn verify(&self, device_id: &str, pin: &str, stored: &str) -> bool {
        match hex::decode(stored) {
            Ok(expected) => self.mac(device_id, pin).verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}
