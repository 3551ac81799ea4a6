use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::payload::TelemetryReport;
use crate::{
    alerts::{AlertThrottle, Notification, Notifier},
    clock::Clock,
    control::{ota, policy, Decision},
    db::models::Reading,
    error::{AuthError, EngineError},
    registry::{self, credential},
    store::DeviceStore,
};

/// What the device is told to do after one accepted report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportOutcome {
    pub device_id: String,
    pub name: String,
    pub decision: Decision,
    pub ota: bool,
    pub mist_duration_secs: i32,
    pub reading_id: Uuid,
}

/// Per-report orchestration: authenticate, validate, persist, decide,
/// alert, hand out OTA, respond.
pub struct ReconciliationEngine {
    store: Arc<dyn DeviceStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    throttle: AlertThrottle,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        throttle: AlertThrottle,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            throttle,
        }
    }

    /// Handle a raw report as received over the wire.
    ///
    /// The credential is taken from the `Authorization` header value, falling
    /// back to the body's `token` field. Authentication is checked before the
    /// payload, so an anonymous garbage body is an auth error.
    pub async fn handle_report(
        &self,
        authorization: Option<&str>,
        body: &[u8],
    ) -> Result<ReportOutcome, EngineError> {
        let json = serde_json::from_slice::<Value>(body).ok();

        let device = registry::resolve(
            self.store.as_ref(),
            credential::extract(authorization, json.as_ref()),
        )
        .await?;

        let report = TelemetryReport::from_json(json.as_ref())?;
        self.reconcile(&device.device_id, report).await
    }

    /// Run one locked report cycle for an authenticated device.
    ///
    /// Reading, live fields, alert stamp and OTA clear commit together or not
    /// at all. The alert itself goes out after the commit, off the request
    /// path, and its failure is only logged.
    pub async fn reconcile(
        &self,
        device_id: &str,
        report: TelemetryReport,
    ) -> Result<ReportOutcome, EngineError> {
        let Some(mut tx) = self.store.lock_device(device_id).await? else {
            // removed between lookup and lock
            return Err(AuthError::Unknown.into());
        };

        let now = self.clock.now();
        let local_time = self.clock.local_time(now);

        let device = tx.device_mut();
        device.record_feedback(now, report.feedback);

        let decision = policy::evaluate(device, report.temperature, report.humidity, local_time);
        let notification = self.throttle.maybe_alert(device, report.temperature, now);
        let ota = ota::take_request(device);
        let name = device.name.clone();
        let mist_duration_secs = device.mist_duration_secs;

        let reading = Reading::new(
            device_id,
            now,
            report.temperature,
            report.humidity,
            report.feedback,
        );
        tx.append_reading(&reading).await?;
        tx.commit().await?;
        drop(tx);

        info!(
            device_id = %device_id,
            temperature = report.temperature,
            humidity = report.humidity,
            is_day = decision.is_day,
            light = decision.light,
            heater = decision.heater,
            mist = decision.mist,
            ota,
            "Report reconciled"
        );

        if let Some(notification) = notification {
            self.dispatch(notification);
        }

        Ok(ReportOutcome {
            device_id: device_id.to_owned(),
            name,
            decision,
            ota,
            mist_duration_secs,
            reading_id: reading.id,
        })
    }

    /// Deliver in the background; the device's acknowledgment never waits
    /// on the relay.
    fn dispatch(&self, notification: Notification) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            match notifier.send(&notification).await {
                Ok(()) => info!(
                    device_id = %notification.device_id,
                    kind = ?notification.kind,
                    "Temperature alert sent"
                ),
                Err(e) => warn!(
                    device_id = %notification.device_id,
                    error = %e,
                    "Failed to deliver temperature alert"
                ),
            }
        });
    }
}
