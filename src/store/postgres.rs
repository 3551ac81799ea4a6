use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;

use super::{DeviceStore, DeviceTx, StoreError};
use crate::db::models::{AllowedDevice, Device, LightMode, MistMode, Reading};

const DEVICE_COLUMNS: &str = r#"
    device_id, name, credential,
    day_target_temp, night_target_temp,
    light_mode, light_manual_state, light_window_start, light_window_end,
    mist_enabled, mist_mode, mist_min_humidity, mist_duration_secs,
    mist_slot_1, mist_slot_2, mist_slot_3, mist_slot_4,
    alerts_enabled, alert_recipient, alert_min_temp, alert_max_temp, last_alert_sent,
    last_seen, online,
    reported_heater, reported_mist, reported_light,
    ota_requested
"#;

const READING_COLUMNS: &str = r#"
    id, device_id, recorded_at, temperature, humidity,
    heater_reported, mist_reported, light_reported
"#;

/// Row shape of the `devices` table; the four schedule columns fold into
/// `Device::mist_schedule`.
#[derive(Debug, FromRow)]
struct DeviceRow {
    device_id: String,
    name: String,
    credential: String,
    day_target_temp: f64,
    night_target_temp: f64,
    light_mode: LightMode,
    light_manual_state: bool,
    light_window_start: NaiveTime,
    light_window_end: NaiveTime,
    mist_enabled: bool,
    mist_mode: MistMode,
    mist_min_humidity: f64,
    mist_duration_secs: i32,
    mist_slot_1: Option<NaiveTime>,
    mist_slot_2: Option<NaiveTime>,
    mist_slot_3: Option<NaiveTime>,
    mist_slot_4: Option<NaiveTime>,
    alerts_enabled: bool,
    alert_recipient: Option<String>,
    alert_min_temp: f64,
    alert_max_temp: f64,
    last_alert_sent: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    online: bool,
    reported_heater: bool,
    reported_mist: bool,
    reported_light: bool,
    ota_requested: bool,
}

impl From<DeviceRow> for Device {
    fn from(r: DeviceRow) -> Self {
        Self {
            device_id: r.device_id,
            name: r.name,
            credential: r.credential,
            day_target_temp: r.day_target_temp,
            night_target_temp: r.night_target_temp,
            light_mode: r.light_mode,
            light_manual_state: r.light_manual_state,
            light_window_start: r.light_window_start,
            light_window_end: r.light_window_end,
            mist_enabled: r.mist_enabled,
            mist_mode: r.mist_mode,
            mist_min_humidity: r.mist_min_humidity,
            mist_duration_secs: r.mist_duration_secs,
            mist_schedule: [r.mist_slot_1, r.mist_slot_2, r.mist_slot_3, r.mist_slot_4]
                .into_iter()
                .flatten()
                .collect(),
            alerts_enabled: r.alerts_enabled,
            alert_recipient: r.alert_recipient,
            alert_min_temp: r.alert_min_temp,
            alert_max_temp: r.alert_max_temp,
            last_alert_sent: r.last_alert_sent,
            last_seen: r.last_seen,
            online: r.online,
            reported_heater: r.reported_heater,
            reported_mist: r.reported_mist,
            reported_light: r.reported_light,
            ota_requested: r.ota_requested,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgDeviceStore {
    pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn select_device(&self, column: &str, value: &str) -> Result<Option<Device>, StoreError> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE {column} = $1");
        let row = sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl DeviceStore for PgDeviceStore {
    async fn find_by_credential(&self, credential: &str) -> Result<Option<Device>, StoreError> {
        self.select_device("credential", credential).await
    }

    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, StoreError> {
        self.select_device("device_id", device_id).await
    }

    async fn lock_device(&self, device_id: &str) -> Result<Option<Box<dyn DeviceTx>>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE device_id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(device_id)
            .fetch_optional(&mut *tx)
            .await?;

        // dropping `tx` on the `None` path rolls it back
        Ok(row.map(|r| {
            debug!(device_id = %device_id, "Device row locked");
            Box::new(PgDeviceTx {
                tx: Some(tx),
                device: r.into(),
            }) as Box<dyn DeviceTx>
        }))
    }

    async fn latest_reading(&self, device_id: &str) -> Result<Option<Reading>, StoreError> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM readings \
             WHERE device_id = $1 ORDER BY recorded_at DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, Reading>(&sql)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn request_ota(&self, device_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE devices SET ota_requested = TRUE WHERE device_id = $1")
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_stale_offline(
        &self,
        cutoff: DateTime<Utc>,
        device_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET online = FALSE
            WHERE online
              AND (last_seen IS NULL OR last_seen < $1)
              AND ($2::text IS NULL OR device_id = $2)
            "#,
        )
        .bind(cutoff)
        .bind(device_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find_allowed(&self, device_id: &str) -> Result<Option<AllowedDevice>, StoreError> {
        let row = sqlx::query_as::<_, AllowedDevice>(
            "SELECT device_id, pin_hash FROM allowed_devices WHERE device_id = $1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_allowed(&self, device_id: &str, pin_hash: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO allowed_devices (device_id, pin_hash)
            VALUES ($1, $2)
            ON CONFLICT (device_id) DO UPDATE SET pin_hash = excluded.pin_hash
            "#,
        )
        .bind(device_id)
        .bind(pin_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_device(&self, device_id: &str, credential: &str) -> Result<Device, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO devices (device_id, name, credential)
            VALUES ($1, $2, $3)
            ON CONFLICT (device_id) DO UPDATE SET device_id = excluded.device_id
            RETURNING {DEVICE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(device_id)
            .bind(format!("New {device_id}"))
            .bind(credential)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }
}

pub struct PgDeviceTx {
    tx: Option<Transaction<'static, Postgres>>,
    device: Device,
}

#[async_trait]
impl DeviceTx for PgDeviceTx {
    fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    async fn append_reading(&mut self, reading: &Reading) -> Result<(), StoreError> {
        let tx = self.tx.as_mut().ok_or(StoreError::Finished)?;
        sqlx::query(
            r#"
            INSERT INTO readings
                (id, device_id, recorded_at, temperature, humidity,
                 heater_reported, mist_reported, light_reported)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(reading.id)
        .bind(&reading.device_id)
        .bind(reading.recorded_at)
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.heater_reported)
        .bind(reading.mist_reported)
        .bind(reading.light_reported)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut tx = self.tx.take().ok_or(StoreError::Finished)?;
        let d = &self.device;

        sqlx::query(
            r#"
            UPDATE devices
            SET last_seen       = $2,
                online          = $3,
                reported_heater = $4,
                reported_mist   = $5,
                reported_light  = $6,
                last_alert_sent = GREATEST(last_alert_sent, $7),
                ota_requested   = $8
            WHERE device_id = $1
            "#,
        )
        .bind(&d.device_id)
        .bind(d.last_seen)
        .bind(d.online)
        .bind(d.reported_heater)
        .bind(d.reported_mist)
        .bind(d.reported_light)
        .bind(d.last_alert_sent)
        .bind(d.ota_requested)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests (need a Postgres instance: DATABASE_URL=... cargo test -- --ignored)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::models::Feedback;

    async fn seeded(pool: PgPool) -> PgDeviceStore {
        let store = PgDeviceStore::new(pool);
        store.ensure_device("dev1", "tok-1").await.unwrap();
        store
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn ensure_device_applies_defaults_and_is_idempotent(pool: PgPool) {
        let store = PgDeviceStore::new(pool);
        let first = store.ensure_device("dev1", "tok-1").await.unwrap();
        let again = store.ensure_device("dev1", "tok-2").await.unwrap();

        assert_eq!(first, Device::with_defaults("dev1", "tok-1"));
        assert_eq!(again.credential, "tok-1");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn commit_persists_reading_and_live_fields(pool: PgPool) {
        let store = seeded(pool).await;
        let now = Utc::now();
        let feedback = Feedback {
            heater: true,
            mist: false,
            light: true,
        };

        let mut tx = store.lock_device("dev1").await.unwrap().unwrap();
        tx.device_mut().record_feedback(now, feedback);
        tx.append_reading(&Reading::new("dev1", now, 20.0, 50.0, feedback))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let d = store.find_by_credential("tok-1").await.unwrap().unwrap();
        assert!(d.online);
        assert!(d.reported_heater);
        let r = store.latest_reading("dev1").await.unwrap().unwrap();
        assert_eq!(r.temperature, 20.0);
        assert!(r.heater_reported);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn dropped_transaction_leaves_no_trace(pool: PgPool) {
        let store = seeded(pool).await;
        {
            let mut tx = store.lock_device("dev1").await.unwrap().unwrap();
            tx.device_mut().online = true;
            tx.append_reading(&Reading::new("dev1", Utc::now(), 20.0, 50.0, Feedback::default()))
                .await
                .unwrap();
        }

        assert!(store.latest_reading("dev1").await.unwrap().is_none());
        assert!(!store.find_device("dev1").await.unwrap().unwrap().online);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn last_alert_sent_never_moves_backwards(pool: PgPool) {
        let store = seeded(pool).await;
        let later = Utc::now();

        let mut tx = store.lock_device("dev1").await.unwrap().unwrap();
        tx.device_mut().last_alert_sent = Some(later);
        tx.commit().await.unwrap();

        let mut tx = store.lock_device("dev1").await.unwrap().unwrap();
        tx.device_mut().last_alert_sent = Some(later - Duration::hours(1));
        tx.commit().await.unwrap();

        let d = store.find_device("dev1").await.unwrap().unwrap();
        let stored = d.last_alert_sent.unwrap();
        assert!((stored - later).num_milliseconds().abs() < 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn request_ota_and_stale_sweep(pool: PgPool) {
        let store = seeded(pool).await;
        assert!(store.request_ota("dev1").await.unwrap());
        assert!(!store.request_ota("ghost").await.unwrap());
        assert!(store.find_device("dev1").await.unwrap().unwrap().ota_requested);

        let mut tx = store.lock_device("dev1").await.unwrap().unwrap();
        tx.device_mut()
            .record_feedback(Utc::now() - Duration::minutes(5), Feedback::default());
        tx.commit().await.unwrap();

        let changed = store
            .mark_stale_offline(Utc::now() - Duration::seconds(30), None)
            .await
            .unwrap();
        assert_eq!(changed, 1);
        assert!(!store.find_device("dev1").await.unwrap().unwrap().online);
    }
}
