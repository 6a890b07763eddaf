use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

pub type UserId = i64;
pub type ReadingId = i64;
pub type AlertId = i64;

/// Field name → human readable reason. Empty when the reading is valid.
pub type ValidationErrors = BTreeMap<String, String>;

/// A vital-sign reading ready to be stored.
///
/// Temperatures are always °F here; unit conversion happens at the payload
/// boundary. Vital fields are optional because invalid readings are stored
/// too, with the missing or malformed values left empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewReading {
    pub user_id: UserId,
    pub body_temperature: Option<f64>,
    pub pulse_rate: Option<i32>,
    pub heart_rate: Option<i32>,
    pub spo2: Option<f64>,
    pub blood_pressure_systolic: Option<i32>,
    pub blood_pressure_diastolic: Option<i32>,
    pub device_id: Option<String>,
    pub battery_level: Option<f64>,
    pub signal_strength: Option<i32>,
    pub timestamp: DateTime<Utc>,
    pub recorded_at: Option<DateTime<Utc>>,
    pub is_valid: bool,
    pub validation_errors: ValidationErrors,
    pub notes: Option<String>,
    pub symptoms: Option<String>,
    pub is_offline_data: bool,
}

impl NewReading {
    pub fn into_reading(self, id: ReadingId) -> Reading {
        Reading {
            id,
            user_id: self.user_id,
            body_temperature: self.body_temperature,
            pulse_rate: self.pulse_rate,
            heart_rate: self.heart_rate,
            spo2: self.spo2,
            blood_pressure_systolic: self.blood_pressure_systolic,
            blood_pressure_diastolic: self.blood_pressure_diastolic,
            device_id: self.device_id,
            battery_level: self.battery_level,
            signal_strength: self.signal_strength,
            timestamp: self.timestamp,
            recorded_at: self.recorded_at,
            is_valid: self.is_valid,
            validation_errors: self.validation_errors,
            notes: self.notes,
            symptoms: self.symptoms,
            is_offline_data: self.is_offline_data,
        }
    }
}

/// A stored reading. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Reading {
    pub id: ReadingId,
    pub user_id: UserId,
    pub body_temperature: Option<f64>,
    pub pulse_rate: Option<i32>,
    pub heart_rate: Option<i32>,
    pub spo2: Option<f64>,
    pub blood_pressure_systolic: Option<i32>,
    pub blood_pressure_diastolic: Option<i32>,
    pub device_id: Option<String>,
    pub battery_level: Option<f64>,
    pub signal_strength: Option<i32>,
    pub timestamp: DateTime<Utc>,
    pub recorded_at: Option<DateTime<Utc>>,
    pub is_valid: bool,
    #[sqlx(json)]
    pub validation_errors: ValidationErrors,
    pub notes: Option<String>,
    pub symptoms: Option<String>,
    pub is_offline_data: bool,
}

impl Reading {
    /// Device clock ahead of the server: the reading claims to have been
    /// recorded after it was received.
    pub fn has_clock_skew(&self) -> bool {
        self.recorded_at.is_some_and(|recorded| recorded > self.timestamp)
    }

    /// "systolic/diastolic" when both pressures were measured.
    pub fn blood_pressure(&self) -> Option<String> {
        match (self.blood_pressure_systolic, self.blood_pressure_diastolic) {
            (Some(systolic), Some(diastolic)) => Some(format!("{systolic}/{diastolic}")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    TemperatureHigh,
    TemperatureLow,
    PulseHigh,
    PulseLow,
    HeartRateHigh,
    Spo2Low,
    BatteryLow,
}

impl AlertType {
    pub const ALL: [AlertType; 7] = [
        AlertType::TemperatureHigh,
        AlertType::TemperatureLow,
        AlertType::PulseHigh,
        AlertType::PulseLow,
        AlertType::HeartRateHigh,
        AlertType::Spo2Low,
        AlertType::BatteryLow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::TemperatureHigh => "temperature_high",
            AlertType::TemperatureLow => "temperature_low",
            AlertType::PulseHigh => "pulse_high",
            AlertType::PulseLow => "pulse_low",
            AlertType::HeartRateHigh => "heart_rate_high",
            AlertType::Spo2Low => "spo2_low",
            AlertType::BatteryLow => "battery_low",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown alert type '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// An alert produced by the threshold engine, not yet attached to a stored
/// reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAlert {
    pub user_id: UserId,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub created_at: DateTime<Utc>,
}

impl NewAlert {
    pub fn into_alert(self, id: AlertId, reading_id: Option<ReadingId>) -> Alert {
        Alert {
            id,
            user_id: self.user_id,
            reading_id,
            alert_type: self.alert_type,
            severity: self.severity,
            message: self.message,
            value: self.value,
            threshold: self.threshold,
            created_at: self.created_at,
            acknowledged: false,
            acknowledged_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub user_id: UserId,
    pub reading_id: Option<ReadingId>,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for Alert {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let alert_type: String = row.try_get("alert_type")?;
        let severity: String = row.try_get("severity")?;

        Ok(Alert {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            reading_id: row.try_get("reading_id")?,
            alert_type: alert_type.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                index: "alert_type".to_string(),
                source: e.into(),
            })?,
            severity: severity.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                index: "severity".to_string(),
                source: e.into(),
            })?,
            message: row.try_get("message")?,
            value: row.try_get("value")?,
            threshold: row.try_get("threshold")?,
            created_at: row.try_get("created_at")?,
            acknowledged: row.try_get("acknowledged")?,
            acknowledged_at: row.try_get("acknowledged_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_type_round_trips_through_text() {
        for alert_type in AlertType::ALL {
            assert_eq!(alert_type.as_str().parse::<AlertType>(), Ok(alert_type));
        }
        assert!("fever".parse::<AlertType>().is_err());
    }

    #[test]
    fn test_alert_type_serializes_as_snake_case() {
        let json = serde_json::to_string(&AlertType::Spo2Low).unwrap();
        assert_eq!(json, "\"spo2_low\"");
    }

    #[test]
    fn test_clock_skew_detection() {
        let now = Utc::now();
        let reading = NewReading {
            user_id: 1,
            body_temperature: Some(98.6),
            pulse_rate: Some(72),
            heart_rate: Some(75),
            spo2: None,
            blood_pressure_systolic: None,
            blood_pressure_diastolic: None,
            device_id: None,
            battery_level: None,
            signal_strength: None,
            timestamp: now,
            recorded_at: Some(now - chrono::Duration::minutes(5)),
            is_valid: true,
            validation_errors: ValidationErrors::new(),
            notes: None,
            symptoms: None,
            is_offline_data: true,
        };
        assert!(!reading.clone().into_reading(1).has_clock_skew());

        let skewed = NewReading {
            recorded_at: Some(now + chrono::Duration::minutes(5)),
            ..reading
        };
        assert!(skewed.into_reading(2).has_clock_skew());
    }
}
