//! Ingestion orchestrator: validate, evaluate alerts, persist.
//!
//! Both transports (HTTP and MQTT) funnel into [`Ingestor`], so a reading is
//! handled the same way regardless of how it arrived.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::alerts::{self, CooldownPolicy};
use crate::config::{Config, Thresholds};
use crate::errors::{Error, Result};
use crate::metrics::{
    ALERTS_TOTAL, BATCH_ITEMS_SKIPPED_TOTAL, CLOCK_SKEW_TOTAL, INGEST_LATENCY_SECONDS,
    INVALID_READINGS_TOTAL, READINGS_TOTAL, REJECTED_REQUESTS_TOTAL, VALID_READINGS_TOTAL,
};
use crate::model::{
    Alert, AlertType, NewAlert, NewReading, ReadingId, Severity, UserId, ValidationErrors,
};
use crate::payload::{BatchUpload, RawReading};
use crate::store::{PendingReading, Recorded, Store};
use crate::validate::validate;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub reading_id: ReadingId,
    pub user_id: UserId,
    pub is_valid: bool,
    pub alerts_triggered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<ValidationErrors>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub user_id: UserId,
    pub total_readings: usize,
    pub saved_readings: usize,
    pub alerts_triggered: usize,
}

pub struct Ingestor {
    store: Arc<dyn Store>,
    thresholds: Thresholds,
    max_batch_size: usize,
    cooldown: CooldownPolicy,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Store>,
        thresholds: Thresholds,
        max_batch_size: usize,
        cooldown: CooldownPolicy,
    ) -> Self {
        Self {
            store,
            thresholds,
            max_batch_size,
            cooldown,
        }
    }

    pub fn from_config(store: Arc<dyn Store>, config: &Config) -> Self {
        Self::new(
            store,
            config.thresholds.clone(),
            config.max_batch_size,
            CooldownPolicy::new(config.alert_cooldown),
        )
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Stores one reading, valid or not, and the alerts it raises.
    pub async fn ingest_one(&self, user_id: UserId, raw: &RawReading) -> Result<IngestOutcome> {
        let start = Instant::now();
        self.ensure_user(user_id).await?;

        let reading = self.prepare(user_id, raw, Utc::now());
        let pending = self.plan_alerts(reading).await?;
        let recorded = self.persist(pending).await?;

        INGEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
        record_metrics(&recorded);

        let reading = &recorded.reading;
        info!(
            user_id,
            reading_id = reading.id,
            is_valid = reading.is_valid,
            alerts = recorded.alerts.len(),
            "Reading stored"
        );

        Ok(IngestOutcome {
            reading_id: reading.id,
            user_id,
            is_valid: reading.is_valid,
            alerts_triggered: recorded.alerts.len(),
            validation_errors: (!reading.is_valid).then(|| reading.validation_errors.clone()),
        })
    }

    /// Unpacks a batch envelope and ingests its readings.
    pub async fn ingest_upload(&self, upload: BatchUpload) -> Result<BatchOutcome> {
        let user_id = upload.user_id()?;
        let device_id = upload.device_id();
        let items = upload
            .readings
            .ok_or_else(|| Error::MalformedPayload("No readings provided".to_string()))?;
        self.ingest_batch(user_id, device_id, items).await
    }

    /// Stores buffered offline readings. Bad items are skipped, the rest
    /// are written in one transaction.
    pub async fn ingest_batch(
        &self,
        user_id: UserId,
        device_id: Option<String>,
        items: Vec<Value>,
    ) -> Result<BatchOutcome> {
        let start = Instant::now();
        self.ensure_user(user_id).await?;

        let total = items.len();
        if total > self.max_batch_size {
            REJECTED_REQUESTS_TOTAL.inc();
            return Err(Error::BatchTooLarge {
                size: total,
                max: self.max_batch_size,
            });
        }

        let now = Utc::now();
        let issued = self.recent_alerts(user_id, now).await?;
        let mut recent = issued.clone();
        let mut pending = Vec::with_capacity(total);
        let mut candidates = Vec::with_capacity(total);
        for (index, item) in items.into_iter().enumerate() {
            let raw = match RawReading::from_value(item) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(user_id, index, "Skipping batch item: {}", e);
                    BATCH_ITEMS_SKIPPED_TOTAL.inc();
                    continue;
                }
            };

            let mut reading = self.prepare(user_id, &raw, now);
            reading.is_offline_data = true;
            if device_id.is_some() {
                reading.device_id = device_id.clone();
            }

            let raised = if reading.is_valid {
                alerts::evaluate(&reading, &self.thresholds.alerts)
            } else {
                Vec::new()
            };
            let alerts = self.cooldown.retain(raised.clone(), &mut recent);
            candidates.push(raised);
            pending.push(PendingReading { reading, alerts });
        }

        let mut results = self.store.insert_batch(&pending).await?;
        let lost_suppressor = results
            .iter()
            .zip(&pending)
            .any(|(result, item)| result.is_err() && !item.alerts.is_empty());
        if self.cooldown.is_enabled() && lost_suppressor {
            self.reissue_suppressed(issued, candidates, &mut results).await;
        }

        let mut saved = 0;
        let mut alerts_triggered = 0;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(recorded) => {
                    saved += 1;
                    alerts_triggered += recorded.alerts.len();
                    record_metrics(&recorded);
                }
                Err(e) => {
                    warn!(user_id, index, "Failed to store batch item: {}", e);
                    BATCH_ITEMS_SKIPPED_TOTAL.inc();
                }
            }
        }

        INGEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
        info!(
            user_id,
            total,
            saved,
            alerts = alerts_triggered,
            "Offline batch stored"
        );

        Ok(BatchOutcome {
            user_id,
            total_readings: total,
            saved_readings: saved,
            alerts_triggered,
        })
    }

    /// Replays the batch cooldown over the stored items only. An alert that
    /// was suppressed by one whose item failed to store is written now.
    async fn reissue_suppressed(
        &self,
        mut recent: Vec<(AlertType, DateTime<Utc>)>,
        candidates: Vec<Vec<NewAlert>>,
        results: &mut [Result<Recorded>],
    ) {
        for (raised, result) in candidates.into_iter().zip(results.iter_mut()) {
            let Ok(recorded) = result else {
                continue;
            };

            let missing: Vec<NewAlert> = self
                .cooldown
                .retain(raised, &mut recent)
                .into_iter()
                .filter(|alert| {
                    !recorded
                        .alerts
                        .iter()
                        .any(|stored| stored.alert_type == alert.alert_type)
                })
                .collect();
            if missing.is_empty() {
                continue;
            }

            match self.store.insert_alerts(recorded.reading.id, &missing).await {
                Ok(stored) => recorded.alerts.extend(stored),
                Err(e) => warn!(
                    reading_id = recorded.reading.id,
                    alerts = missing.len(),
                    "Failed to store alerts released by a failed batch item: {}",
                    e
                ),
            }
        }
    }

    async fn ensure_user(&self, user_id: UserId) -> Result<()> {
        if self.store.user_exists(user_id).await? {
            Ok(())
        } else {
            REJECTED_REQUESTS_TOTAL.inc();
            Err(Error::UnknownUser(user_id))
        }
    }

    fn prepare(&self, user_id: UserId, raw: &RawReading, now: DateTime<Utc>) -> NewReading {
        let vitals = raw.vitals();
        let validation = validate(&vitals, &self.thresholds.validation);
        if !validation.is_valid {
            debug!(user_id, errors = ?validation.errors, "Reading failed validation");
        }

        NewReading {
            user_id,
            body_temperature: vitals.body_temperature.value(),
            pulse_rate: vitals.pulse_rate.value(),
            heart_rate: vitals.heart_rate.value(),
            spo2: vitals.spo2.value(),
            blood_pressure_systolic: vitals.blood_pressure_systolic.value(),
            blood_pressure_diastolic: vitals.blood_pressure_diastolic.value(),
            device_id: raw.device_id(),
            battery_level: vitals.battery_level.value(),
            signal_strength: vitals.signal_strength.value(),
            timestamp: now,
            recorded_at: raw.recorded_at(),
            is_valid: validation.is_valid,
            validation_errors: validation.errors,
            notes: raw.notes(),
            symptoms: raw.symptoms(),
            is_offline_data: raw.is_offline_data(),
        }
    }

    async fn plan_alerts(&self, reading: NewReading) -> Result<PendingReading> {
        if !reading.is_valid {
            return Ok(PendingReading {
                reading,
                alerts: Vec::new(),
            });
        }

        let candidates = alerts::evaluate(&reading, &self.thresholds.alerts);
        let alerts = if candidates.is_empty() {
            candidates
        } else {
            let mut recent = self.recent_alerts(reading.user_id, reading.timestamp).await?;
            self.cooldown.retain(candidates, &mut recent)
        };
        Ok(PendingReading { reading, alerts })
    }

    async fn recent_alerts(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<(AlertType, DateTime<Utc>)>> {
        if !self.cooldown.is_enabled() {
            return Ok(Vec::new());
        }
        self.store
            .recent_alert_types(user_id, self.cooldown.since(now))
            .await
    }

    /// Writes the reading with its alerts. If that fails, the reading alone is
    /// retried so an alert write problem never loses the measurement.
    async fn persist(&self, pending: PendingReading) -> Result<Recorded> {
        match self.store.insert_reading(&pending).await {
            Ok(recorded) => Ok(recorded),
            Err(e @ Error::Database(_)) if !pending.alerts.is_empty() => {
                warn!(
                    user_id = pending.reading.user_id,
                    alerts = pending.alerts.len(),
                    "Storing reading with alerts failed, retrying without alerts: {}",
                    e
                );
                let bare = PendingReading {
                    reading: pending.reading,
                    alerts: Vec::new(),
                };
                self.store.insert_reading(&bare).await
            }
            Err(e) => Err(e),
        }
    }
}

fn record_metrics(recorded: &Recorded) {
    let reading = &recorded.reading;
    READINGS_TOTAL.inc();
    if reading.is_valid {
        VALID_READINGS_TOTAL.inc();
    } else {
        INVALID_READINGS_TOTAL.inc();
    }

    if reading.has_clock_skew() {
        CLOCK_SKEW_TOTAL.inc();
        warn!(
            user_id = reading.user_id,
            reading_id = reading.id,
            "Reading recorded_at is later than receipt time, device clock may be skewed"
        );
    }

    for alert in &recorded.alerts {
        log_alert(alert);
    }
}

fn log_alert(alert: &Alert) {
    ALERTS_TOTAL
        .with_label_values(&[alert.alert_type.as_str(), alert.severity.as_str()])
        .inc();
    match alert.severity {
        Severity::Critical => error!(
            user_id = alert.user_id,
            alert_id = alert.id,
            alert_type = %alert.alert_type,
            "{}",
            alert.message
        ),
        Severity::Warning => warn!(
            user_id = alert.user_id,
            alert_id = alert.id,
            alert_type = %alert.alert_type,
            "{}",
            alert.message
        ),
        Severity::Info => info!(
            user_id = alert.user_id,
            alert_id = alert.id,
            alert_type = %alert.alert_type,
            "{}",
            alert.message
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::{AlertId, Reading};
    use crate::store::{AlertFilter, PurgeReport};

    fn ingestor(store: Arc<MemoryStore>) -> Ingestor {
        Ingestor::new(store, Thresholds::default(), 100, CooldownPolicy::default())
    }

    fn raw(value: Value) -> RawReading {
        RawReading::from_value(value).unwrap()
    }

    fn normal() -> Value {
        json!({
            "device_id": "ESP32_001",
            "body_temperature": 98.6,
            "pulse_rate": 72,
            "heart_rate": 75,
            "spo2": 98.0,
            "battery_level": 85
        })
    }

    #[tokio::test]
    async fn test_worked_example_raises_three_alerts() {
        let store = Arc::new(MemoryStore::with_users([1]));
        let ingestor = ingestor(store.clone());

        let outcome = ingestor
            .ingest_one(
                1,
                &raw(json!({
                    "body_temperature": 101.2,
                    "pulse_rate": 130,
                    "heart_rate": 95,
                    "spo2": 88
                })),
            )
            .await
            .unwrap();

        assert!(outcome.is_valid);
        assert_eq!(outcome.alerts_triggered, 3);
        assert_eq!(outcome.validation_errors, None);
        assert_eq!(store.reading_count().await, 1);

        let alerts = store
            .alerts(1, AlertFilter { acknowledged: None, limit: 10 })
            .await
            .unwrap();
        assert!(alerts.iter().all(|a| a.reading_id == Some(outcome.reading_id)));
    }

    #[tokio::test]
    async fn test_invalid_reading_is_stored_without_alerts() {
        let store = Arc::new(MemoryStore::with_users([1]));
        let ingestor = ingestor(store.clone());

        let outcome = ingestor
            .ingest_one(
                1,
                &raw(json!({ "body_temperature": 108.2, "pulse_rate": 210, "heart_rate": 0 })),
            )
            .await
            .unwrap();

        assert!(!outcome.is_valid);
        assert_eq!(outcome.alerts_triggered, 0);
        let errors = outcome.validation_errors.unwrap();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors["heart_rate"], "Heart rate not measured (no sensor contact)");
        assert_eq!(store.reading_count().await, 1);
        assert_eq!(store.alert_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_user_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone());

        let result = ingestor.ingest_one(42, &raw(normal())).await;
        assert_matches!(result, Err(Error::UnknownUser(42)));
        assert_eq!(store.reading_count().await, 0);
    }

    #[tokio::test]
    async fn test_celsius_reading_is_stored_in_fahrenheit() {
        let store = Arc::new(MemoryStore::with_users([1]));
        let ingestor = ingestor(store.clone());

        let mut payload = normal();
        payload["body_temperature"] = json!(38.5);
        payload["temperature_unit"] = json!("C");
        ingestor.ingest_one(1, &raw(payload)).await.unwrap();

        let latest = store.latest_reading(1).await.unwrap().unwrap();
        assert_eq!(latest.body_temperature, Some(101.3));
        assert_eq!(latest.device_id.as_deref(), Some("ESP32_001"));
    }

    #[tokio::test]
    async fn test_batch_skips_malformed_items() {
        let store = Arc::new(MemoryStore::with_users([7]));
        let ingestor = ingestor(store.clone());

        let mut fever = normal();
        fever["body_temperature"] = json!(103.0);
        let items = vec![normal(), json!("garbage"), fever, normal()];

        let outcome = ingestor
            .ingest_batch(7, Some("ESP32_BUF".to_string()), items)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BatchOutcome {
                user_id: 7,
                total_readings: 4,
                saved_readings: 3,
                alerts_triggered: 1,
            }
        );

        let (readings, total) = store.readings_page(7, 0, 10).await.unwrap();
        assert_eq!(total, 3);
        assert!(readings.iter().all(|r| r.is_offline_data));
        assert!(readings.iter().all(|r| r.device_id.as_deref() == Some("ESP32_BUF")));
    }

    #[tokio::test]
    async fn test_batch_keeps_item_device_without_envelope_device() {
        let store = Arc::new(MemoryStore::with_users([7]));
        let ingestor = ingestor(store.clone());

        ingestor.ingest_batch(7, None, vec![normal()]).await.unwrap();

        let latest = store.latest_reading(7).await.unwrap().unwrap();
        assert_eq!(latest.device_id.as_deref(), Some("ESP32_001"));
    }

    #[tokio::test]
    async fn test_batch_too_large_is_rejected() {
        let store = Arc::new(MemoryStore::with_users([7]));
        let ingestor = Ingestor::new(store.clone(), Thresholds::default(), 2, CooldownPolicy::default());

        let result = ingestor.ingest_batch(7, None, vec![normal(); 3]).await;
        assert_matches!(result, Err(Error::BatchTooLarge { size: 3, max: 2 }));
        assert_eq!(store.reading_count().await, 0);
    }

    #[tokio::test]
    async fn test_batch_for_unknown_user_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let result = ingestor(store).ingest_batch(9, None, vec![normal()]).await;
        assert_matches!(result, Err(Error::UnknownUser(9)));
    }

    #[tokio::test]
    async fn test_upload_without_readings_is_malformed() {
        let store = Arc::new(MemoryStore::with_users([7]));
        let upload: BatchUpload = serde_json::from_value(json!({ "user_id": 7 })).unwrap();

        let result = ingestor(store).ingest_upload(upload).await;
        assert_matches!(result, Err(Error::MalformedPayload(msg)) if msg == "No readings provided");
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_repeat_alerts() {
        let store = Arc::new(MemoryStore::with_users([1]));
        let ingestor = Ingestor::new(
            store.clone(),
            Thresholds::default(),
            100,
            CooldownPolicy::new(Duration::from_secs(600)),
        );

        let mut fever = normal();
        fever["body_temperature"] = json!(101.0);
        let first = ingestor.ingest_one(1, &raw(fever.clone())).await.unwrap();
        let second = ingestor.ingest_one(1, &raw(fever)).await.unwrap();

        assert_eq!(first.alerts_triggered, 1);
        assert_eq!(second.alerts_triggered, 0);
        assert_eq!(store.reading_count().await, 2);
    }

    /// Wraps [`MemoryStore`] and fails chosen writes.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        /// Fail every single-reading write that carries alerts.
        fail_alert_writes: bool,
        /// Fail this batch item while the rest of the batch commits.
        fail_batch_item: Option<usize>,
    }

    impl FlakyStore {
        fn new(users: impl IntoIterator<Item = UserId>) -> Self {
            Self {
                inner: MemoryStore::with_users(users),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }
        async fn user_exists(&self, user_id: UserId) -> Result<bool> {
            self.inner.user_exists(user_id).await
        }
        async fn insert_reading(&self, pending: &PendingReading) -> Result<Recorded> {
            if self.fail_alert_writes && !pending.alerts.is_empty() {
                return Err(Error::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.insert_reading(pending).await
        }
        async fn insert_batch(&self, items: &[PendingReading]) -> Result<Vec<Result<Recorded>>> {
            let mut results = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                if self.fail_batch_item == Some(index) {
                    results.push(Err(Error::Database(sqlx::Error::RowNotFound)));
                } else {
                    results.push(self.inner.insert_reading(item).await);
                }
            }
            Ok(results)
        }
        async fn insert_alerts(
            &self,
            reading_id: ReadingId,
            alerts: &[NewAlert],
        ) -> Result<Vec<Alert>> {
            self.inner.insert_alerts(reading_id, alerts).await
        }
        async fn valid_readings_between(
            &self,
            user_id: UserId,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<Reading>> {
            self.inner.valid_readings_between(user_id, from, to).await
        }
        async fn latest_reading(&self, user_id: UserId) -> Result<Option<Reading>> {
            self.inner.latest_reading(user_id).await
        }
        async fn readings_page(
            &self,
            user_id: UserId,
            offset: u64,
            limit: u64,
        ) -> Result<(Vec<Reading>, u64)> {
            self.inner.readings_page(user_id, offset, limit).await
        }
        async fn alerts(&self, user_id: UserId, filter: AlertFilter) -> Result<Vec<Alert>> {
            self.inner.alerts(user_id, filter).await
        }
        async fn recent_alert_types(
            &self,
            user_id: UserId,
            since: DateTime<Utc>,
        ) -> Result<Vec<(AlertType, DateTime<Utc>)>> {
            self.inner.recent_alert_types(user_id, since).await
        }
        async fn get_alert(&self, alert_id: AlertId) -> Result<Option<Alert>> {
            self.inner.get_alert(alert_id).await
        }
        async fn acknowledge_alert(
            &self,
            alert_id: AlertId,
            at: DateTime<Utc>,
        ) -> Result<Option<Alert>> {
            self.inner.acknowledge_alert(alert_id, at).await
        }
        async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport> {
            self.inner.purge_before(cutoff).await
        }
    }

    fn fever(temp: f64) -> Value {
        let mut payload = normal();
        payload["body_temperature"] = json!(temp);
        payload
    }

    #[tokio::test]
    async fn test_alert_write_failure_keeps_reading() {
        let store = Arc::new(FlakyStore {
            fail_alert_writes: true,
            ..FlakyStore::new([1])
        });
        let ingestor = Ingestor::new(store.clone(), Thresholds::default(), 100, CooldownPolicy::default());

        let outcome = ingestor.ingest_one(1, &raw(fever(101.0))).await.unwrap();

        assert!(outcome.is_valid);
        assert_eq!(outcome.alerts_triggered, 0);
        assert_eq!(store.inner.reading_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_batch_item_is_isolated() {
        let store = Arc::new(FlakyStore {
            fail_batch_item: Some(1),
            ..FlakyStore::new([7])
        });
        let ingestor = Ingestor::new(store.clone(), Thresholds::default(), 100, CooldownPolicy::default());

        let items = vec![fever(101.0), normal(), fever(103.0), normal()];
        let outcome = ingestor.ingest_batch(7, None, items).await.unwrap();

        assert_eq!(
            outcome,
            BatchOutcome {
                user_id: 7,
                total_readings: 4,
                saved_readings: 3,
                alerts_triggered: 2,
            }
        );
        assert_eq!(store.inner.reading_count().await, 3);

        let alerts = store
            .inner
            .alerts(7, AlertFilter { acknowledged: None, limit: 10 })
            .await
            .unwrap();
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.alert_type == AlertType::TemperatureHigh));
        assert!(alerts.iter().all(|a| a.reading_id.is_some()));
    }

    #[tokio::test]
    async fn test_failed_batch_item_does_not_suppress_later_alerts() {
        let store = Arc::new(FlakyStore {
            fail_batch_item: Some(0),
            ..FlakyStore::new([7])
        });
        let ingestor = Ingestor::new(
            store.clone(),
            Thresholds::default(),
            100,
            CooldownPolicy::new(Duration::from_secs(600)),
        );

        let items = vec![fever(103.0), fever(103.0), fever(103.0)];
        let outcome = ingestor.ingest_batch(7, None, items).await.unwrap();

        assert_eq!(outcome.saved_readings, 2);
        assert_eq!(outcome.alerts_triggered, 1);

        let alerts = store
            .inner
            .alerts(7, AlertFilter { acknowledged: None, limit: 10 })
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::TemperatureHigh);
        assert_eq!(alerts[0].severity, Severity::Critical);

        let (readings, _) = store.inner.readings_page(7, 0, 10).await.unwrap();
        let first_stored = readings.iter().map(|r| r.id).min();
        assert_eq!(alerts[0].reading_id, first_stored);
    }
}
