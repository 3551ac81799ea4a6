use std::num::NonZeroU32;

use anyhow::{anyhow, Context, Result};
use chrono::TimeDelta;
use chrono_tz::Tz;

/// Upper bound for every configured duration.
const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// HMAC key for device PIN hashes.
    pub pin_secret: String,
    /// Bearer token for operator endpoints (status, OTA trigger).
    pub admin_api_token: String,
    pub server_host: String,
    pub server_port: u16,
    pub db_max_connections: u32,
    /// Timezone of the devices' site; drives light windows and mist schedules.
    pub device_timezone: Tz,
    /// Minimum spacing between two temperature alerts for one device.
    pub alert_cooldown: TimeDelta,
    /// A device is considered offline after this much silence.
    pub online_timeout: TimeDelta,
    /// Presence sweep interval in seconds.
    pub presence_interval_secs: u64,
    /// Mail relay endpoint; alerts are only logged when unset.
    pub notifier_webhook_url: Option<String>,
    pub alert_sender: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .with_context(|| format!("missing required env var: {key}"))
        };
        let optional = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            pin_secret: required("PIN_SECRET")?,
            admin_api_token: required("ADMIN_API_TOKEN")?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            db_max_connections: optional("DB_MAX_CONNECTIONS", "10")
                .parse::<NonZeroU32>()
                .map(NonZeroU32::get)
                .context("DB_MAX_CONNECTIONS must be a positive integer")?,
            device_timezone: parse_timezone(&optional("DEVICE_TIMEZONE", "UTC"))?,
            alert_cooldown: parse_duration(&optional("ALERT_COOLDOWN_SECS", "900"))
                .context("ALERT_COOLDOWN_SECS must be a number of seconds up to one year")?,
            online_timeout: parse_duration(&optional("ONLINE_TIMEOUT_SECS", "30"))
                .context("ONLINE_TIMEOUT_SECS must be a number of seconds up to one year")?,
            presence_interval_secs: parse_interval(&optional("PRESENCE_INTERVAL_SECS", "10"))
                .context("PRESENCE_INTERVAL_SECS must be a positive integer")?,
            notifier_webhook_url: lookup("NOTIFIER_WEBHOOK_URL").filter(|v| !v.is_empty()),
            alert_sender: optional("ALERT_SENDER", "system@animallogic.pl"),
        })
    }
}

/// Parse an IANA timezone name such as `"Europe/Warsaw"`.
fn parse_timezone(raw: &str) -> Result<Tz> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow!("unknown timezone in DEVICE_TIMEZONE {raw:?}: {e}"))
}

/// `tokio::time::interval` panics on zero, so zero is rejected here.
fn parse_interval(raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>()? {
        0 => Err(anyhow!("interval must be greater than zero")),
        n if n > MAX_DURATION_SECS => Err(anyhow!("interval exceeds {MAX_DURATION_SECS} seconds")),
        n => Ok(n),
    }
}

/// Seconds, bounded so that `now - duration` always stays in chrono's range.
fn parse_duration(raw: &str) -> Result<TimeDelta> {
    let secs = raw.trim().parse::<u64>()?;
    if secs > MAX_DURATION_SECS {
        return Err(anyhow!("duration exceeds {MAX_DURATION_SECS} seconds"));
    }
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| anyhow!("duration out of range: {secs}"))
}
