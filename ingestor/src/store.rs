//! Storage seam for readings and alerts.
//!
//! Readings and alerts are append-only and partitioned by user. The only
//! mutation is acknowledging an alert, and the only deletion is the
//! retention sweep.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::Result;
use crate::model::{
    Alert, AlertId, AlertType, NewAlert, NewReading, Reading, ReadingId, UserId,
};

/// A reading together with the alerts it raised, written as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReading {
    pub reading: NewReading,
    pub alerts: Vec<NewAlert>,
}

/// What a [`PendingReading`] became once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub reading: Reading,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertFilter {
    /// `None` lists both acknowledged and open alerts.
    pub acknowledged: Option<bool>,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub readings_deleted: u64,
    pub alerts_deleted: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()>;

    async fn user_exists(&self, user_id: UserId) -> Result<bool>;

    /// Stores a reading and its alerts atomically: either all of them are
    /// committed or none is.
    async fn insert_reading(&self, pending: &PendingReading) -> Result<Recorded>;

    /// Stores a batch in one transaction with per-item isolation. The outer
    /// error means the whole batch was lost; an inner error only affects
    /// that item.
    async fn insert_batch(&self, items: &[PendingReading]) -> Result<Vec<Result<Recorded>>>;

    /// Attaches alerts to a reading that is already stored.
    async fn insert_alerts(&self, reading_id: ReadingId, alerts: &[NewAlert]) -> Result<Vec<Alert>>;

    /// Valid readings with `from <= timestamp < to`, oldest first.
    async fn valid_readings_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>>;

    /// Most recent reading by receipt time, valid or not.
    async fn latest_reading(&self, user_id: UserId) -> Result<Option<Reading>>;

    /// Readings newest first, plus the total count for the user.
    async fn readings_page(
        &self,
        user_id: UserId,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Reading>, u64)>;

    /// Alerts newest first.
    async fn alerts(&self, user_id: UserId, filter: AlertFilter) -> Result<Vec<Alert>>;

    /// `(type, created_at)` of the user's alerts created at or after `since`.
    async fn recent_alert_types(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<(AlertType, DateTime<Utc>)>>;

    async fn get_alert(&self, alert_id: AlertId) -> Result<Option<Alert>>;

    /// Marks an alert acknowledged unless it already is, and returns its
    /// current state. An already acknowledged alert keeps its first
    /// `acknowledged_at`.
    async fn acknowledge_alert(&self, alert_id: AlertId, at: DateTime<Utc>) -> Result<Option<Alert>>;

    /// Deletes readings and alerts older than `cutoff`.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport>;
}
