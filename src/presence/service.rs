use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time;
use tracing::{error, info};

use crate::{
    clock::Clock,
    db::models::Device,
    store::{DeviceStore, StoreError},
};

/// Keeps the cached `online` flag honest: a device is online only while its
/// last report is younger than `timeout`.
#[derive(Clone)]
pub struct PresenceService {
    store: Arc<dyn DeviceStore>,
    clock: Arc<dyn Clock>,
    timeout: TimeDelta,
    interval: Duration,
}

impl PresenceService {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        clock: Arc<dyn Clock>,
        timeout: TimeDelta,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            timeout,
            interval,
        }
    }

    /// Runs the sweep loop indefinitely.
    /// Spawn this via `tokio::spawn`.
    pub async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.timeout.num_seconds(),
            "Presence sweep started"
        );
        let mut ticker = time::interval(self.interval);

        loop {
            ticker.tick().await;
            match self.sweep(None).await {
                Ok(0) => {}
                Ok(n) => info!(devices = n, "Marked stale devices offline"),
                Err(e) => error!(error = %e, "Presence sweep failed"),
            }
        }
    }

    /// Flip stale devices offline; `device_id` limits the sweep to one device.
    pub async fn sweep(&self, device_id: Option<&str>) -> Result<u64, StoreError> {
        // a cutoff before the representable range means nothing is stale yet
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(self.timeout)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.store.mark_stale_offline(cutoff, device_id).await
    }

    pub fn is_online(&self, device: &Device) -> bool {
        is_fresh(device.last_seen, self.clock.now(), self.timeout)
    }
}

pub fn is_fresh(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>, timeout: TimeDelta) -> bool {
    last_seen.is_some_and(|seen| now - seen < timeout)
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::{clock::ManualClock, store::MemoryDeviceStore};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn freshness_window() {
        let timeout = Duration::seconds(30);
        assert!(is_fresh(Some(now() - Duration::seconds(5)), now(), timeout));
        assert!(!is_fresh(Some(now() - Duration::seconds(30)), now(), timeout));
        assert!(!is_fresh(Some(now() - Duration::minutes(5)), now(), timeout));
        assert!(!is_fresh(None, now(), timeout));
    }

    #[tokio::test]
    async fn sweep_marks_zombie_devices_offline() {
        let store = MemoryDeviceStore::new();
        let mut zombie = Device::with_defaults("zombie", "t1");
        zombie.online = true;
        zombie.last_seen = Some(now() - Duration::minutes(5));
        let mut healthy = Device::with_defaults("healthy", "t2");
        healthy.online = true;
        healthy.last_seen = Some(now() - Duration::seconds(5));
        store.insert_device(zombie).await;
        store.insert_device(healthy).await;

        let presence = PresenceService::new(
            Arc::new(store.clone()),
            Arc::new(ManualClock::new(now(), chrono_tz::UTC)),
            Duration::seconds(30),
            StdDuration::from_secs(10),
        );

        assert_eq!(presence.sweep(None).await.unwrap(), 1);
        assert!(!store.find_device("zombie").await.unwrap().unwrap().online);
        let healthy = store.find_device("healthy").await.unwrap().unwrap();
        assert!(healthy.online);
        assert!(presence.is_online(&healthy));
    }

    #[tokio::test]
    async fn huge_timeout_never_marks_anything_stale() {
        let store = MemoryDeviceStore::new();
        let mut ancient = Device::with_defaults("ancient", "t1");
        ancient.online = true;
        ancient.last_seen = Some(now() - Duration::days(3650));
        store.insert_device(ancient).await;

        let presence = PresenceService::new(
            Arc::new(store.clone()),
            Arc::new(ManualClock::new(now(), chrono_tz::UTC)),
            Duration::days(365 * 1_000_000),
            StdDuration::from_secs(10),
        );

        assert_eq!(presence.sweep(None).await.unwrap(), 0);
        assert!(store.find_device("ancient").await.unwrap().unwrap().online);
    }
}
