//! Rolling-window statistics and health summaries.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::ConcernThresholds;
use crate::errors::Result;
use crate::model::{Alert, Reading, UserId};
use crate::store::{AlertFilter, Store};

pub const DEFAULT_WINDOW_DAYS: u32 = 7;
pub const MAX_WINDOW_DAYS: u32 = 90;
pub const SUMMARY_ALERT_LIMIT: u64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RangeStats<T> {
    pub average: Option<f64>,
    pub min: Option<T>,
    pub max: Option<T>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AverageStats {
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub body_temperature: RangeStats<f64>,
    pub pulse_rate: RangeStats<i32>,
    pub heart_rate: AverageStats,
    pub spo2: AverageStats,
    pub total_readings: u64,
    pub period_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub statistics: Stats,
    pub latest_reading: Option<Reading>,
    pub active_alerts: Vec<Alert>,
    pub concerns: Vec<String>,
    pub period_days: u32,
}

/// Clamps a requested window to `1..=90` days.
pub fn clamp_window(days: Option<i64>) -> u32 {
    days.unwrap_or(DEFAULT_WINDOW_DAYS.into())
        .clamp(1, MAX_WINDOW_DAYS.into()) as u32
}

/// Aggregates readings. Invalid readings and readings outside
/// `[now - days, now)` are ignored; an empty window yields `None`
/// aggregates rather than zeros.
pub fn compute(readings: &[Reading], days: u32, now: DateTime<Utc>) -> Stats {
    let from = now - Duration::days(days.into());
    let window: Vec<&Reading> = readings
        .iter()
        .filter(|r| r.is_valid && r.timestamp >= from && r.timestamp < now)
        .collect();

    let temps: Vec<f64> = window.iter().filter_map(|r| r.body_temperature).collect();
    let pulses: Vec<i32> = window.iter().filter_map(|r| r.pulse_rate).collect();
    let heart_rates: Vec<f64> = window.iter().filter_map(|r| r.heart_rate.map(f64::from)).collect();
    let spo2s: Vec<f64> = window.iter().filter_map(|r| r.spo2).collect();

    Stats {
        body_temperature: RangeStats {
            average: average(&temps),
            min: temps.iter().copied().reduce(f64::min).map(round_tenth),
            max: temps.iter().copied().reduce(f64::max).map(round_tenth),
        },
        pulse_rate: RangeStats {
            average: average(&pulses.iter().map(|&p| f64::from(p)).collect::<Vec<_>>()),
            min: pulses.iter().copied().min(),
            max: pulses.iter().copied().max(),
        },
        heart_rate: AverageStats {
            average: average(&heart_rates),
        },
        spo2: AverageStats {
            average: average(&spo2s),
        },
        total_readings: window.len() as u64,
        period_days: days,
    }
}

/// Advisory hints derived from the averages. Never persisted.
pub fn concerns(stats: &Stats, thresholds: &ConcernThresholds) -> Vec<String> {
    let mut concerns = Vec::new();
    if stats
        .body_temperature
        .average
        .is_some_and(|avg| avg > thresholds.average_temperature)
    {
        concerns.push("Elevated average temperature".to_string());
    }
    if stats
        .pulse_rate
        .average
        .is_some_and(|avg| avg > thresholds.average_pulse)
    {
        concerns.push("Elevated average pulse rate".to_string());
    }
    concerns
}

pub async fn statistics(
    store: &dyn Store,
    user_id: UserId,
    days: u32,
    now: DateTime<Utc>,
) -> Result<Stats> {
    let days = days.clamp(1, MAX_WINDOW_DAYS);
    let from = now - Duration::days(days.into());
    let readings = store.valid_readings_between(user_id, from, now).await?;
    Ok(compute(&readings, days, now))
}

pub async fn summary(
    store: &dyn Store,
    user_id: UserId,
    days: u32,
    now: DateTime<Utc>,
    thresholds: &ConcernThresholds,
) -> Result<Summary> {
    let statistics = statistics(store, user_id, days, now).await?;
    let latest_reading = store.latest_reading(user_id).await?;
    let active_alerts = store
        .alerts(
            user_id,
            AlertFilter {
                acknowledged: Some(false),
                limit: SUMMARY_ALERT_LIMIT,
            },
        )
        .await?;
    let concerns = concerns(&statistics, thresholds);

    Ok(Summary {
        period_days: statistics.period_days,
        statistics,
        latest_reading,
        active_alerts,
        concerns,
    })
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(round_tenth(values.iter().sum::<f64>() / values.len() as f64))
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
