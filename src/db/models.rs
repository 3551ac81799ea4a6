use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Mirrors the `light_mode` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "light_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LightMode {
    /// Follow the configured day window.
    Auto,
    /// Hold `light_manual_state`.
    Manual,
}

/// Mirrors the `mist_mode` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "mist_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MistMode {
    /// Humidity-driven with a 5 % deadband.
    Auto,
    /// Pulse on configured minutes of the day.
    Schedule,
}

/// Maximum number of mist schedule slots a device may configure.
pub const MAX_MIST_SLOTS: usize = 4;

/// Configuration and live state of one reporting device.
///
/// Configuration fields are owned by the operator UI; the engine only writes
/// the live fields (`last_seen`, `online`, `reported_*`, `last_alert_sent`,
/// `ota_requested`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub name: String,
    pub credential: String,

    /// Degrees Celsius
    pub day_target_temp: f64,
    /// Degrees Celsius
    pub night_target_temp: f64,

    pub light_mode: LightMode,
    pub light_manual_state: bool,
    pub light_window_start: NaiveTime,
    pub light_window_end: NaiveTime,

    pub mist_enabled: bool,
    pub mist_mode: MistMode,
    /// Relative humidity percentage
    pub mist_min_humidity: f64,
    pub mist_duration_secs: i32,
    pub mist_schedule: Vec<NaiveTime>,

    pub alerts_enabled: bool,
    pub alert_recipient: Option<String>,
    pub alert_min_temp: f64,
    pub alert_max_temp: f64,
    pub last_alert_sent: Option<DateTime<Utc>>,

    pub last_seen: Option<DateTime<Utc>>,
    pub online: bool,

    pub reported_heater: bool,
    pub reported_mist: bool,
    pub reported_light: bool,

    pub ota_requested: bool,
}

impl Device {
    /// A freshly provisioned device with factory defaults.
    pub fn with_defaults(device_id: &str, credential: &str) -> Self {
        Self {
            device_id: device_id.to_owned(),
            name: format!("New {device_id}"),
            credential: credential.to_owned(),
            day_target_temp: 28.0,
            night_target_temp: 22.0,
            light_mode: LightMode::Auto,
            light_manual_state: false,
            light_window_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            light_window_end: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN),
            mist_enabled: true,
            mist_mode: MistMode::Schedule,
            mist_min_humidity: 60.0,
            mist_duration_secs: 10,
            mist_schedule: Vec::new(),
            alerts_enabled: true,
            alert_recipient: None,
            alert_min_temp: 18.0,
            alert_max_temp: 35.0,
            last_alert_sent: None,
            last_seen: None,
            online: false,
            reported_heater: false,
            reported_mist: false,
            reported_light: false,
            ota_requested: false,
        }
    }

    /// Record an accepted report: the device is alive and its actuators are
    /// in the reported state.
    pub fn record_feedback(&mut self, now: DateTime<Utc>, feedback: Feedback) {
        self.last_seen = Some(now);
        self.online = true;
        self.reported_heater = feedback.heater;
        self.reported_mist = feedback.mist;
        self.reported_light = feedback.light;
    }
}

/// Actuator states as reported by the device itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub heater: bool,
    pub mist: bool,
    pub light: bool,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,
    pub device_id: String,
    pub recorded_at: DateTime<Utc>,
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity percentage
    pub humidity: f64,
    pub heater_reported: bool,
    pub mist_reported: bool,
    pub light_reported: bool,
}

impl Reading {
    pub fn new(
        device_id: &str,
        recorded_at: DateTime<Utc>,
        temperature: f64,
        humidity: f64,
        feedback: Feedback,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.to_owned(),
            recorded_at,
            temperature,
            humidity,
            heater_reported: feedback.heater,
            mist_reported: feedback.mist,
            light_reported: feedback.light,
        }
    }
}

/// Whitelist entry for the PIN exchange.
#[derive(Debug, Clone, FromRow)]
pub struct AllowedDevice {
    pub device_id: String,
    pub pin_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_factory_settings() {
        let d = Device::with_defaults("D1001", "tok");
        assert_eq!(d.name, "New D1001");
        assert_eq!(d.day_target_temp, 28.0);
        assert_eq!(d.night_target_temp, 22.0);
        assert_eq!(d.light_window_start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(d.light_window_end, NaiveTime::from_hms_opt(20, 0, 0).unwrap());
        assert_eq!(d.mist_mode, MistMode::Schedule);
        assert!(!d.online);
        assert!(!d.ota_requested);
    }

    #[test]
    fn record_feedback_marks_online_and_stores_states() {
        let mut d = Device::with_defaults("D1001", "tok");
        let now = Utc::now();
        d.record_feedback(
            now,
            Feedback {
                heater: true,
                mist: false,
                light: true,
            },
        );
        assert_eq!(d.last_seen, Some(now));
        assert!(d.online);
        assert!(d.reported_heater);
        assert!(!d.reported_mist);
        assert!(d.reported_light);
    }

    #[test]
    fn modes_serialise_as_snake_case() {
        assert_eq!(serde_json::to_value(LightMode::Manual).unwrap(), "manual");
        assert_eq!(serde_json::to_value(MistMode::Schedule).unwrap(), "schedule");
    }
}
