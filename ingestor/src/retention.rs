use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, Instant};
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::store::{PurgeReport, Store};

/// Periodically deletes readings and alerts older than `retention_days`.
/// Runs until the task is dropped.
pub async fn run_retention(store: Arc<dyn Store>, retention_days: u32, every: Duration) {
    info!(
        "Starting retention sweeper with retention_days={}, interval={}s",
        retention_days,
        every.as_secs()
    );

    let mut ticker = interval(every.max(Duration::from_secs(1)));
    loop {
        ticker.tick().await;
        if let Err(e) = sweep(store.as_ref(), retention_days, Utc::now()).await {
            error!("Retention sweep failed: {}", e);
        }
    }
}

/// One sweep with the cutoff `now - retention_days`.
pub async fn sweep(store: &dyn Store, retention_days: u32, now: DateTime<Utc>) -> Result<PurgeReport> {
    let cutoff = chrono::Duration::try_days(retention_days.into())
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or_else(|| {
            warn!(
                "Retention of {} days reaches past the earliest representable date, nothing to purge",
                retention_days
            );
            DateTime::<Utc>::MIN_UTC
        });
    let start = Instant::now();

    let report = store.purge_before(cutoff).await?;
    let elapsed = start.elapsed().as_secs_f64();
    if report.readings_deleted > 0 || report.alerts_deleted > 0 {
        info!(
            readings = report.readings_deleted,
            alerts = report.alerts_deleted,
            "Purged data older than {} in {:.3}s",
            cutoff,
            elapsed
        );
    } else {
        debug!("Nothing older than {} to purge", cutoff);
    }
    Ok(report)
}
