use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;

/// Source of server time.
///
/// UTC is used for persistence; the device-local time-of-day drives the
/// light window and the mist schedule.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Wall-clock time-of-day at the devices' site for the instant `at`.
    fn local_time(&self, at: DateTime<Utc>) -> NaiveTime;
}

/// The real clock, converting to a configured IANA timezone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_time(&self, at: DateTime<Utc>) -> NaiveTime {
        at.with_timezone(&self.tz).time()
    }
}

/// A settable clock for tests and simulations.
///
/// Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
    tz: Tz,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
            tz,
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn local_time(&self, at: DateTime<Utc>) -> NaiveTime {
        at.with_timezone(&self.tz).time()
    }
}
