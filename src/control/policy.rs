//! Pure actuator policy: configuration + measurement + feedback + time-of-day
//! in, desired light/heater/mist out. No I/O.

use chrono::{NaiveTime, Timelike};

use crate::db::models::{Device, LightMode, MistMode, MAX_MIST_SLOTS};

/// Heater hysteresis band below the target, degrees Celsius.
pub const HEATER_HYSTERESIS: f64 = 0.5;

/// Humidity band above `mist_min_humidity` in which misting keeps its
/// reported state, percentage points.
pub const MIST_HYSTERESIS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub light: bool,
    pub heater: bool,
    pub mist: bool,
    pub is_day: bool,
    /// Day or night target that drove the heater decision.
    pub target_temperature: f64,
}

pub fn evaluate(device: &Device, temperature: f64, humidity: f64, now: NaiveTime) -> Decision {
    let is_day = match device.light_mode {
        LightMode::Manual => device.light_manual_state,
        LightMode::Auto => in_window(device.light_window_start, device.light_window_end, now),
    };

    let target_temperature = if is_day {
        device.day_target_temp
    } else {
        device.night_target_temp
    };

    Decision {
        light: is_day,
        heater: heater_state(temperature, target_temperature, device.reported_heater),
        mist: mist_state(device, humidity, now),
        is_day,
        target_temperature,
    }
}

/// Half-open window containment that wraps past midnight when
/// `start >= end`.
pub fn in_window(start: NaiveTime, end: NaiveTime, now: NaiveTime) -> bool {
    if start < end {
        start <= now && now < end
    } else {
        now >= start || now < end
    }
}

fn heater_state(temperature: f64, target: f64, reported: bool) -> bool {
    if temperature < target - HEATER_HYSTERESIS {
        true
    } else if temperature > target {
        false
    } else {
        // deadband: keep the relay where it is
        reported
    }
}

fn mist_state(device: &Device, humidity: f64, now: NaiveTime) -> bool {
    if !device.mist_enabled {
        return false;
    }

    match device.mist_mode {
        MistMode::Auto => {
            if humidity < device.mist_min_humidity {
                true
            } else if humidity > device.mist_min_humidity + MIST_HYSTERESIS {
                false
            } else {
                device.reported_mist
            }
        }
        MistMode::Schedule => device
            .mist_schedule
            .iter()
            .take(MAX_MIST_SLOTS)
            .any(|slot| same_minute(*slot, now)),
    }
}

fn same_minute(a: NaiveTime, b: NaiveTime) -> bool {
    a.hour() == b.hour() && a.minute() == b.minute()
}
