//! Threshold alert engine.
//!
//! [`evaluate`] is a pure function of a valid reading and the configured
//! thresholds. Every qualifying reading produces fresh alerts; suppression of
//! repeats is the separate, opt-in [`CooldownPolicy`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::AlertThresholds;
use crate::errors::{Error, Result};
use crate::model::{Alert, AlertId, AlertType, NewAlert, NewReading, Severity, UserId};
use crate::store::Store;

/// Device battery level below which an info alert is raised, in percent.
pub const BATTERY_LOW_PERCENT: f64 = 15.0;

/// Evaluates a reading against the alert thresholds.
///
/// Callers pass only valid readings. Conditions are independent, so one
/// reading may raise several alerts.
pub fn evaluate(reading: &NewReading, thresholds: &AlertThresholds) -> Vec<NewAlert> {
    let mut alerts = Vec::new();
    let mut raise = |alert_type: AlertType,
                     severity: Severity,
                     message: String,
                     value: f64,
                     threshold: f64| {
        alerts.push(NewAlert {
            user_id: reading.user_id,
            alert_type,
            severity,
            message,
            value,
            threshold,
            created_at: reading.timestamp,
        });
    };

    if let Some(temp) = reading.body_temperature {
        if temp >= thresholds.temperature_high {
            let severity = if temp >= thresholds.temperature_critical {
                Severity::Critical
            } else {
                Severity::Warning
            };
            raise(
                AlertType::TemperatureHigh,
                severity,
                format!("High body temperature detected: {temp}°F (Fever)"),
                temp,
                thresholds.temperature_high,
            );
        } else if temp <= thresholds.temperature_low {
            raise(
                AlertType::TemperatureLow,
                Severity::Warning,
                format!("Low body temperature detected: {temp}°F (Hypothermia)"),
                temp,
                thresholds.temperature_low,
            );
        }
    }

    if let Some(pulse) = reading.pulse_rate {
        if pulse >= thresholds.pulse_high {
            raise(
                AlertType::PulseHigh,
                Severity::Warning,
                format!("High pulse rate detected: {pulse} bpm (Tachycardia)"),
                pulse.into(),
                thresholds.pulse_high.into(),
            );
        } else if pulse <= thresholds.pulse_low {
            raise(
                AlertType::PulseLow,
                Severity::Warning,
                format!("Low pulse rate detected: {pulse} bpm (Bradycardia)"),
                pulse.into(),
                thresholds.pulse_low.into(),
            );
        }
    }

    if let Some(hr) = reading.heart_rate {
        if hr >= thresholds.heart_rate_high {
            raise(
                AlertType::HeartRateHigh,
                Severity::Warning,
                format!("High heart rate detected: {hr} bpm"),
                hr.into(),
                thresholds.heart_rate_high.into(),
            );
        }
    }

    if let Some(spo2) = reading.spo2 {
        if spo2 < thresholds.spo2_low {
            raise(
                AlertType::Spo2Low,
                Severity::Critical,
                format!("Low oxygen saturation: {spo2}% (Hypoxia)"),
                spo2,
                thresholds.spo2_low,
            );
        }
    }

    if let Some(battery) = reading.battery_level {
        if battery < BATTERY_LOW_PERCENT {
            raise(
                AlertType::BatteryLow,
                Severity::Info,
                format!("Device battery low: {battery}%"),
                battery,
                BATTERY_LOW_PERCENT,
            );
        }
    }

    alerts
}

/// Suppresses a new alert when the same user already got one of the same type
/// within the cooldown window. A zero window disables suppression.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CooldownPolicy {
    pub window: Duration,
}

impl CooldownPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn is_enabled(&self) -> bool {
        !self.window.is_zero()
    }

    /// Start of the window that matters for alerts created at `now`.
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Keeps the candidates not covered by a `recent` alert of the same type.
    /// `recent` holds `(type, created_at)` of alerts already issued to the
    /// same user; it is extended with the kept candidates so consecutive
    /// calls see each other.
    pub fn retain(
        &self,
        candidates: Vec<NewAlert>,
        recent: &mut Vec<(AlertType, DateTime<Utc>)>,
    ) -> Vec<NewAlert> {
        if !self.is_enabled() {
            return candidates;
        }

        let mut kept = Vec::with_capacity(candidates.len());
        for alert in candidates {
            let since = self.since(alert.created_at);
            let suppressed = recent
                .iter()
                .any(|(t, at)| *t == alert.alert_type && *at > since && *at <= alert.created_at);
            if suppressed {
                debug!(
                    user_id = alert.user_id,
                    alert_type = %alert.alert_type,
                    "Alert suppressed by cooldown"
                );
                continue;
            }
            recent.push((alert.alert_type, alert.created_at));
            kept.push(alert);
        }
        kept
    }
}

/// Acknowledges an alert. Idempotent: acknowledging twice leaves the first
/// `acknowledged_at` in place. When `requester` is given it must own the
/// alert.
pub async fn acknowledge(
    store: &dyn Store,
    alert_id: AlertId,
    requester: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<Alert> {
    let alert = store
        .get_alert(alert_id)
        .await?
        .ok_or(Error::AlertNotFound(alert_id))?;

    if let Some(user_id) = requester {
        if alert.user_id != user_id {
            return Err(Error::Forbidden { alert_id, user_id });
        }
    }

    if alert.acknowledged {
        return Ok(alert);
    }

    store
        .acknowledge_alert(alert_id, now)
        .await?
        .ok_or(Error::AlertNotFound(alert_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValidationErrors;

    fn reading(temp: f64, pulse: i32, hr: i32, spo2: Option<f64>) -> NewReading {
        NewReading {
            user_id: 1,
            body_temperature: Some(temp),
            pulse_rate: Some(pulse),
            heart_rate: Some(hr),
            spo2,
            blood_pressure_systolic: None,
            blood_pressure_diastolic: None,
            device_id: Some("ESP32_001".to_string()),
            battery_level: Some(80.0),
            signal_strength: None,
            timestamp: Utc::now(),
            recorded_at: None,
            is_valid: true,
            validation_errors: ValidationErrors::new(),
            notes: None,
            symptoms: None,
            is_offline_data: false,
        }
    }

    fn types(alerts: &[NewAlert]) -> Vec<AlertType> {
        alerts.iter().map(|a| a.alert_type).collect()
    }

    #[test]
    fn test_normal_reading_raises_nothing() {
        let alerts = evaluate(&reading(98.6, 72, 75, Some(98.0)), &AlertThresholds::default());
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_fever_with_tachycardia_and_hypoxia() {
        let alerts = evaluate(&reading(101.2, 130, 95, Some(88.0)), &AlertThresholds::default());

        assert_eq!(
            types(&alerts),
            vec![AlertType::TemperatureHigh, AlertType::PulseHigh, AlertType::Spo2Low]
        );
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].value, 101.2);
        assert_eq!(alerts[0].threshold, 100.4);
        assert_eq!(alerts[1].severity, Severity::Warning);
        assert_eq!(alerts[1].threshold, 120.0);
        assert_eq!(alerts[2].severity, Severity::Critical);
        assert_eq!(alerts[2].threshold, 90.0);
    }

    #[test]
    fn test_temperature_severity_escalates_at_critical_cutoff() {
        let thresholds = AlertThresholds::default();

        let at_threshold = evaluate(&reading(100.4, 72, 75, None), &thresholds);
        assert_eq!(types(&at_threshold), vec![AlertType::TemperatureHigh]);
        assert_eq!(at_threshold[0].severity, Severity::Warning);

        let below_cutoff = evaluate(&reading(101.9, 72, 75, None), &thresholds);
        assert_eq!(below_cutoff[0].severity, Severity::Warning);

        let at_cutoff = evaluate(&reading(102.0, 72, 75, None), &thresholds);
        assert_eq!(at_cutoff.len(), 1);
        assert_eq!(at_cutoff[0].severity, Severity::Critical);
    }

    #[test]
    fn test_low_thresholds() {
        let alerts = evaluate(&reading(96.0, 50, 60, None), &AlertThresholds::default());
        assert_eq!(types(&alerts), vec![AlertType::TemperatureLow, AlertType::PulseLow]);
        assert!(alerts.iter().all(|a| a.severity == Severity::Warning));
    }

    #[test]
    fn test_spo2_threshold_is_strict() {
        let thresholds = AlertThresholds::default();
        assert!(evaluate(&reading(98.6, 72, 75, Some(90.0)), &thresholds).is_empty());
        assert_eq!(
            types(&evaluate(&reading(98.6, 72, 75, Some(89.9)), &thresholds)),
            vec![AlertType::Spo2Low]
        );
    }

    #[test]
    fn test_heart_rate_high() {
        let alerts = evaluate(&reading(98.6, 72, 120, None), &AlertThresholds::default());
        assert_eq!(types(&alerts), vec![AlertType::HeartRateHigh]);
    }

    #[test]
    fn test_battery_low_is_info() {
        let mut r = reading(98.6, 72, 75, None);
        r.battery_level = Some(14.9);

        let alerts = evaluate(&r, &AlertThresholds::default());
        assert_eq!(types(&alerts), vec![AlertType::BatteryLow]);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(alerts[0].threshold, BATTERY_LOW_PERCENT);

        r.battery_level = Some(15.0);
        assert!(evaluate(&r, &AlertThresholds::default()).is_empty());
    }

    #[test]
    fn test_alert_carries_reading_time_and_user() {
        let r = reading(103.0, 72, 75, None);
        let alerts = evaluate(&r, &AlertThresholds::default());
        assert_eq!(alerts[0].created_at, r.timestamp);
        assert_eq!(alerts[0].user_id, r.user_id);
    }

    #[test]
    fn test_disabled_cooldown_keeps_everything() {
        let policy = CooldownPolicy::default();
        let r = reading(101.0, 72, 75, None);
        let alerts = evaluate(&r, &AlertThresholds::default());
        let mut recent = vec![(AlertType::TemperatureHigh, r.timestamp)];

        assert_eq!(policy.retain(alerts, &mut recent).len(), 1);
    }

    #[test]
    fn test_cooldown_suppresses_same_type_within_window() {
        let policy = CooldownPolicy::new(Duration::from_secs(600));
        let r = reading(101.0, 130, 75, None);
        let alerts = evaluate(&r, &AlertThresholds::default());
        let mut recent = vec![(AlertType::TemperatureHigh, r.timestamp - chrono::Duration::minutes(5))];

        let kept = policy.retain(alerts, &mut recent);
        assert_eq!(types(&kept), vec![AlertType::PulseHigh]);
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn test_cooldown_expires() {
        let policy = CooldownPolicy::new(Duration::from_secs(600));
        let r = reading(101.0, 72, 75, None);
        let alerts = evaluate(&r, &AlertThresholds::default());
        let mut recent = vec![(AlertType::TemperatureHigh, r.timestamp - chrono::Duration::minutes(11))];

        assert_eq!(types(&policy.retain(alerts, &mut recent)), vec![AlertType::TemperatureHigh]);
    }

    #[test]
    fn test_cooldown_applies_across_consecutive_readings() {
        let policy = CooldownPolicy::new(Duration::from_secs(600));
        let thresholds = AlertThresholds::default();
        let mut recent = Vec::new();

        let first = policy.retain(evaluate(&reading(101.0, 72, 75, None), &thresholds), &mut recent);
        let second = policy.retain(evaluate(&reading(101.5, 72, 75, None), &thresholds), &mut recent);

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }
}
