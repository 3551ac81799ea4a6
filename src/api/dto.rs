use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::models::{Device, Reading},
    reconcile::ReportOutcome,
};

/// Actuator commands returned to the device after a report.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReportResponse {
    /// Always `"ok"`
    pub status: String,
    pub name: String,
    pub heater: bool,
    pub mist: bool,
    pub light: bool,
    /// `true` at most once per operator request
    pub ota: bool,
    /// Degrees Celsius
    pub target_temperature: f64,
    /// Mist pulse length in seconds
    pub mist_duration: i32,
}

impl From<ReportOutcome> for ReportResponse {
    fn from(o: ReportOutcome) -> Self {
        Self {
            status: "ok".to_owned(),
            name: o.name,
            heater: o.decision.heater,
            mist: o.decision.mist,
            light: o.decision.light,
            ota: o.ota,
            target_temperature: o.decision.target_temperature,
            mist_duration: o.mist_duration_secs,
        }
    }
}

/// Firmware sends the PIN either as a string or as a bare number.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum Pin {
    Text(String),
    Number(u64),
}

impl Pin {
    pub fn into_string(self) -> String {
        match self {
            Self::Text(s) => s.trim().to_owned(),
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeviceAuthRequest {
    pub id: String,
    pub pin: Pin,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeviceAuthResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadingDto {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity percentage
    pub humidity: f64,
    pub heater: bool,
    pub mist: bool,
    pub light: bool,
}

impl From<Reading> for ReadingDto {
    fn from(r: Reading) -> Self {
        Self {
            id: r.id,
            recorded_at: r.recorded_at,
            temperature: r.temperature,
            humidity: r.humidity,
            heater: r.heater_reported,
            mist: r.mist_reported,
            light: r.light_reported,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeviceStatusDto {
    pub device_id: String,
    pub name: String,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub heater: bool,
    pub mist: bool,
    pub light: bool,
    pub ota_pending: bool,
    pub latest: Option<ReadingDto>,
}

impl DeviceStatusDto {
    pub fn new(device: Device, online: bool, latest: Option<Reading>) -> Self {
        Self {
            device_id: device.device_id,
            name: device.name,
            online,
            last_seen: device.last_seen,
            heater: device.reported_heater,
            mist: device.reported_mist,
            light: device.reported_light,
            ota_pending: device.ota_requested,
            latest: latest.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OtaResponse {
    pub device_id: String,
    pub ota_requested: bool,
}

/// Wire shape of a device report. Parsed leniently by the engine, so this is
/// documentation only; legacy aliases `temp`, `hum` and `*_state` are accepted.
#[derive(Debug, Deserialize, ToSchema)]
#[allow(dead_code)]
pub struct ReportRequest {
    /// Fallback when no `Authorization` header is sent
    pub token: Option<String>,
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity percentage
    pub humidity: f64,
    /// Actuator states as the device sees them; absent means `false`
    pub heater_reported: Option<bool>,
    pub mist_reported: Option<bool>,
    pub light_reported: Option<bool>,
}
