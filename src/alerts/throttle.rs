use chrono::{DateTime, Duration, Utc};

use crate::db::models::Device;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    High,
    Low,
}

/// A threshold-breach message ready to hand to a [`Notifier`](super::Notifier).
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub device_id: String,
    pub kind: AlertKind,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Rate-limits temperature alerts per device.
#[derive(Debug, Clone, Copy)]
pub struct AlertThrottle {
    cooldown: Duration,
}

impl AlertThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Decide whether `temperature` warrants an alert right now and, if so,
    /// stamp `last_alert_sent` on `device` in the same step.
    ///
    /// `device` must be the locked working copy of the report cycle; the stamp
    /// commits or rolls back together with the rest of the cycle.
    pub fn maybe_alert(
        &self,
        device: &mut Device,
        temperature: f64,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        let kind = if temperature > device.alert_max_temp {
            AlertKind::High
        } else if temperature < device.alert_min_temp {
            AlertKind::Low
        } else {
            return None;
        };

        if !device.alerts_enabled {
            return None;
        }

        let recipient = device
            .alert_recipient
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())?
            .to_owned();

        if let Some(last) = device.last_alert_sent {
            if now - last < self.cooldown {
                return None;
            }
        }

        device.last_alert_sent = Some(now);

        let (subject, body) = match kind {
            AlertKind::High => (
                format!("ALARM: {} - high temperature!", device.name),
                format!(
                    "Current temperature: {temperature}°C (maximum: {}°C).\nRisk of overheating!",
                    device.alert_max_temp
                ),
            ),
            AlertKind::Low => (
                format!("ALARM: {} - low temperature!", device.name),
                format!(
                    "Current temperature: {temperature}°C (minimum: {}°C).\nCheck the heater!",
                    device.alert_min_temp
                ),
            ),
        };

        Some(Notification {
            device_id: device.device_id.clone(),
            kind,
            recipient,
            subject,
            body,
        })
    }
}
