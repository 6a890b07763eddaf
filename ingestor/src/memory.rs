//! In-process [`Store`] backed by vectors behind a lock.
//!
//! Used by tests and local runs without Postgres.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::errors::Result;
use crate::model::{Alert, AlertId, AlertType, NewAlert, Reading, ReadingId, UserId};
use crate::store::{AlertFilter, PendingReading, PurgeReport, Recorded, Store};

#[derive(Debug, Default)]
struct State {
    users: HashSet<UserId>,
    readings: Vec<Reading>,
    alerts: Vec<Alert>,
    next_reading_id: ReadingId,
    next_alert_id: AlertId,
}

impl State {
    fn record(&mut self, pending: &PendingReading) -> Recorded {
        self.next_reading_id += 1;
        let reading = pending.reading.clone().into_reading(self.next_reading_id);
        self.readings.push(reading.clone());
        let alerts = self.attach(reading.id, &pending.alerts);
        Recorded { reading, alerts }
    }

    fn attach(&mut self, reading_id: ReadingId, alerts: &[NewAlert]) -> Vec<Alert> {
        let stored: Vec<Alert> = alerts
            .iter()
            .map(|alert| {
                self.next_alert_id += 1;
                alert.clone().into_alert(self.next_alert_id, Some(reading_id))
            })
            .collect();
        self.alerts.extend(stored.iter().cloned());
        stored
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            state: RwLock::new(State {
                users: users.into_iter().collect(),
                ..State::default()
            }),
        }
    }

    pub async fn reading_count(&self) -> usize {
        self.state.read().await.readings.len()
    }

    pub async fn alert_count(&self) -> usize {
        self.state.read().await.alerts.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn user_exists(&self, user_id: UserId) -> Result<bool> {
        Ok(self.state.read().await.users.contains(&user_id))
    }

    async fn insert_reading(&self, pending: &PendingReading) -> Result<Recorded> {
        Ok(self.state.write().await.record(pending))
    }

    async fn insert_batch(&self, items: &[PendingReading]) -> Result<Vec<Result<Recorded>>> {
        let mut state = self.state.write().await;
        Ok(items.iter().map(|item| Ok(state.record(item))).collect())
    }

    async fn insert_alerts(&self, reading_id: ReadingId, alerts: &[NewAlert]) -> Result<Vec<Alert>> {
        Ok(self.state.write().await.attach(reading_id, alerts))
    }

    async fn valid_readings_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        let state = self.state.read().await;
        let mut readings: Vec<Reading> = state
            .readings
            .iter()
            .filter(|r| r.user_id == user_id && r.is_valid && r.timestamp >= from && r.timestamp < to)
            .cloned()
            .collect();
        readings.sort_by_key(|r| r.timestamp);
        Ok(readings)
    }

    async fn latest_reading(&self, user_id: UserId) -> Result<Option<Reading>> {
        let state = self.state.read().await;
        Ok(state
            .readings
            .iter()
            .filter(|r| r.user_id == user_id)
            .max_by_key(|r| (r.timestamp, r.id))
            .cloned())
    }

    async fn readings_page(
        &self,
        user_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Reading>, u64)> {
        let state = self.state.read().await;
        let mut readings: Vec<&Reading> =
            state.readings.iter().filter(|r| r.user_id == user_id).collect();
        readings.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));

        let total = readings.len() as u64;
        let page = readings
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn alerts(&self, user_id: UserId, filter: AlertFilter) -> Result<Vec<Alert>> {
        let state = self.state.read().await;
        let mut alerts: Vec<&Alert> = state
            .alerts
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter(|a| filter.acknowledged.map_or(true, |ack| a.acknowledged == ack))
            .collect();
        alerts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(alerts.into_iter().take(filter.limit as usize).cloned().collect())
    }

    async fn recent_alert_types(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<(AlertType, DateTime<Utc>)>> {
        let state = self.state.read().await;
        Ok(state
            .alerts
            .iter()
            .filter(|a| a.user_id == user_id && a.created_at >= since)
            .map(|a| (a.alert_type, a.created_at))
            .collect())
    }

    async fn get_alert(&self, alert_id: AlertId) -> Result<Option<Alert>> {
        let state = self.state.read().await;
        Ok(state.alerts.iter().find(|a| a.id == alert_id).cloned())
    }

    async fn acknowledge_alert(&self, alert_id: AlertId, at: DateTime<Utc>) -> Result<Option<Alert>> {
        let mut state = self.state.write().await;
        Ok(state.alerts.iter_mut().find(|a| a.id == alert_id).map(|alert| {
            if !alert.acknowledged {
                alert.acknowledged = true;
                alert.acknowledged_at = Some(at);
            }
            alert.clone()
        }))
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport> {
        let mut state = self.state.write().await;

        let readings_before = state.readings.len();
        state.readings.retain(|r| r.timestamp >= cutoff);
        let alerts_before = state.alerts.len();
        state.alerts.retain(|a| a.created_at >= cutoff);

        let remaining: HashSet<ReadingId> = state.readings.iter().map(|r| r.id).collect();
        for alert in &mut state.alerts {
            if alert.reading_id.is_some_and(|id| !remaining.contains(&id)) {
                alert.reading_id = None;
            }
        }

        Ok(PurgeReport {
            readings_deleted: (readings_before - state.readings.len()) as u64,
            alerts_deleted: (alerts_before - state.alerts.len()) as u64,
        })
    }
}
