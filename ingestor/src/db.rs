use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Connection;
use tracing::{error, info, warn};

use crate::errors::{Error, Result};
use crate::metrics::DB_FAILURES_TOTAL;
use crate::model::{Alert, AlertId, AlertType, NewAlert, Reading, ReadingId, UserId};
use crate::store::{AlertFilter, PendingReading, PurgeReport, Recorded, Store};

macro_rules! reading_columns {
    () => {
        "id, user_id, body_temperature, pulse_rate, heart_rate, spo2, \
         blood_pressure_systolic, blood_pressure_diastolic, device_id, battery_level, \
         signal_strength, ts AS timestamp, recorded_at, is_valid, validation_errors, \
         notes, symptoms, is_offline_data"
    };
}

macro_rules! alert_columns {
    () => {
        "id, user_id, reading_id, alert_type, severity, message, value, threshold, \
         created_at, acknowledged, acknowledged_at"
    };
}

const MAX_ATTEMPTS: u32 = 5;

pub async fn make_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Postgres-backed [`Store`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_reading_once(&self, pending: &PendingReading) -> Result<Recorded> {
        let mut tx = self.pool.begin().await?;
        let recorded = insert_pending(&mut tx, pending).await?;
        tx.commit().await?;
        Ok(recorded)
    }

    async fn insert_batch_once(&self, items: &[PendingReading]) -> Result<Vec<Result<Recorded>>> {
        let mut tx = self.pool.begin().await?;
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            // One savepoint per item so a failing row only rolls back itself.
            let mut savepoint = tx.begin().await?;
            match insert_pending(&mut savepoint, item).await {
                Ok(recorded) => {
                    savepoint.commit().await?;
                    results.push(Ok(recorded));
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    results.push(Err(e));
                }
            }
        }

        tx.commit().await?;
        Ok(results)
    }

    async fn insert_alerts_once(&self, reading_id: ReadingId, alerts: &[NewAlert]) -> Result<Vec<Alert>> {
        let mut tx = self.pool.begin().await?;
        let stored = insert_alert_rows(&mut tx, reading_id, alerts).await?;
        tx.commit().await?;
        Ok(stored)
    }
}

async fn insert_pending(conn: &mut PgConnection, pending: &PendingReading) -> Result<Recorded> {
    let r = &pending.reading;
    let reading: Reading = sqlx::query_as(concat!(
        "INSERT INTO readings (user_id, body_temperature, pulse_rate, heart_rate, spo2, \
         blood_pressure_systolic, blood_pressure_diastolic, device_id, battery_level, \
         signal_strength, ts, recorded_at, is_valid, validation_errors, notes, symptoms, \
         is_offline_data) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
         RETURNING ",
        reading_columns!()
    ))
    .bind(r.user_id)
    .bind(r.body_temperature)
    .bind(r.pulse_rate)
    .bind(r.heart_rate)
    .bind(r.spo2)
    .bind(r.blood_pressure_systolic)
    .bind(r.blood_pressure_diastolic)
    .bind(&r.device_id)
    .bind(r.battery_level)
    .bind(r.signal_strength)
    .bind(r.timestamp)
    .bind(r.recorded_at)
    .bind(r.is_valid)
    .bind(Json(&r.validation_errors))
    .bind(&r.notes)
    .bind(&r.symptoms)
    .bind(r.is_offline_data)
    .fetch_one(&mut *conn)
    .await?;

    let alerts = insert_alert_rows(conn, reading.id, &pending.alerts).await?;
    Ok(Recorded { reading, alerts })
}

async fn insert_alert_rows(
    conn: &mut PgConnection,
    reading_id: ReadingId,
    pending: &[NewAlert],
) -> Result<Vec<Alert>> {
    let mut alerts = Vec::with_capacity(pending.len());
    for alert in pending {
        let stored: Alert = sqlx::query_as(concat!(
            "INSERT INTO alerts (user_id, reading_id, alert_type, severity, message, value, \
             threshold, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING ",
            alert_columns!()
        ))
        .bind(alert.user_id)
        .bind(reading_id)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(alert.value)
        .bind(alert.threshold)
        .bind(alert.created_at)
        .fetch_one(&mut *conn)
        .await?;
        alerts.push(stored);
    }
    Ok(alerts)
}

/// Runs a write, retrying transient database failures with exponential
/// backoff.
async fn with_retry<T, F, Fut>(operation: &str, mut run: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;
        match run().await {
            Ok(value) => return Ok(value),
            Err(Error::Database(db_err)) => {
                DB_FAILURES_TOTAL.inc();
                if attempts >= MAX_ATTEMPTS || !is_transient_error(&db_err) {
                    error!(
                        "{} failed permanently after {} attempts: {}",
                        operation, attempts, db_err
                    );
                    return Err(Error::Database(db_err));
                }

                let wait_ms = 100 * 2_u64.pow(attempts - 1).min(32);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {}ms: {}",
                    operation, attempts, MAX_ATTEMPTS, wait_ms, db_err
                );
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            }
            Err(e) => {
                error!("{} failed with non-database error: {}", operation, e);
                return Err(e);
            }
        }
    }
}

fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            // Check if it's a connection-related error
            db_err.code().is_some_and(|code| {
                code == "08000" || // connection_exception
                code == "08003" || // connection_does_not_exist
                code == "08006" || // connection_failure
                code == "57P03" || // cannot_connect_now
                code == "53300" // too_many_connections
            })
        }
        _ => false,
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn user_exists(&self, user_id: UserId) -> Result<bool> {
        let exists = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert_reading(&self, pending: &PendingReading) -> Result<Recorded> {
        with_retry("Reading insert", || self.insert_reading_once(pending)).await
    }

    async fn insert_batch(&self, items: &[PendingReading]) -> Result<Vec<Result<Recorded>>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        with_retry("Batch insert", || self.insert_batch_once(items)).await
    }

    async fn insert_alerts(&self, reading_id: ReadingId, alerts: &[NewAlert]) -> Result<Vec<Alert>> {
        if alerts.is_empty() {
            return Ok(Vec::new());
        }
        with_retry("Alert insert", || self.insert_alerts_once(reading_id, alerts)).await
    }

    async fn valid_readings_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        let readings = sqlx::query_as(concat!(
            "SELECT ",
            reading_columns!(),
            " FROM readings WHERE user_id = $1 AND is_valid AND ts >= $2 AND ts < $3 ORDER BY ts"
        ))
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(readings)
    }

    async fn latest_reading(&self, user_id: UserId) -> Result<Option<Reading>> {
        let reading = sqlx::query_as(concat!(
            "SELECT ",
            reading_columns!(),
            " FROM readings WHERE user_id = $1 ORDER BY ts DESC, id DESC LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reading)
    }

    async fn readings_page(
        &self,
        user_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Reading>, u64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM readings WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let readings = sqlx::query_as(concat!(
            "SELECT ",
            reading_columns!(),
            " FROM readings WHERE user_id = $1 ORDER BY ts DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok((readings, total as u64))
    }

    async fn alerts(&self, user_id: UserId, filter: AlertFilter) -> Result<Vec<Alert>> {
        let alerts = sqlx::query_as(concat!(
            "SELECT ",
            alert_columns!(),
            " FROM alerts WHERE user_id = $1 AND ($2::boolean IS NULL OR acknowledged = $2) \
             ORDER BY created_at DESC, id DESC LIMIT $3"
        ))
        .bind(user_id)
        .bind(filter.acknowledged)
        .bind(filter.limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(alerts)
    }

    async fn recent_alert_types(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<(AlertType, DateTime<Utc>)>> {
        let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT alert_type, created_at FROM alerts WHERE user_id = $1 AND created_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(alert_type, created_at)| {
                alert_type.parse().ok().map(|t| (t, created_at))
            })
            .collect())
    }

    async fn get_alert(&self, alert_id: AlertId) -> Result<Option<Alert>> {
        let alert = sqlx::query_as(concat!("SELECT ", alert_columns!(), " FROM alerts WHERE id = $1"))
            .bind(alert_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(alert)
    }

    async fn acknowledge_alert(&self, alert_id: AlertId, at: DateTime<Utc>) -> Result<Option<Alert>> {
        // The row lock serialises racing acknowledgements; COALESCE keeps the
        // first timestamp.
        let alert = sqlx::query_as(concat!(
            "UPDATE alerts SET acknowledged = TRUE, acknowledged_at = COALESCE(acknowledged_at, $2) \
             WHERE id = $1 RETURNING ",
            alert_columns!()
        ))
        .bind(alert_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(alert)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport> {
        let mut tx = self.pool.begin().await?;

        let alerts = sqlx::query("DELETE FROM alerts WHERE created_at < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;
        let readings = sqlx::query("DELETE FROM readings WHERE ts < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(PurgeReport {
            readings_deleted: readings.rows_affected(),
            alerts_deleted: alerts.rows_affected(),
        })
    }
}
