//! Adds a device to the PIN allow-list, or replaces its PIN.
//!
//! Usage:
//!   cargo run --bin provision_device -- <device_id> <pin>

use std::env;

use anyhow::{bail, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use terrarium_service::{
    config::Config,
    db,
    registry::PinHasher,
    store::{DeviceStore, PgDeviceStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [device_id, pin] = args.as_slice() else {
        bail!("usage: provision_device <device_id> <pin>");
    };
    let (device_id, pin) = (device_id.trim(), pin.trim());
    if device_id.is_empty() || pin.is_empty() {
        bail!("device_id and pin must not be empty");
    }

    let config = Config::from_env()?;
    let pool = db::connect(&config.database_url, config.db_max_connections).await?;
    db::migrate(&pool).await?;

    let hasher = PinHasher::new(&config.pin_secret);
    let store = PgDeviceStore::new(pool);
    store.upsert_allowed(device_id, &hasher.hash(device_id, pin)).await?;

    info!(device_id = %device_id, "Device added to allow-list");
    Ok(())
}
