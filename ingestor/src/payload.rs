//! Inbound payload shapes and their defensive parsing.
//!
//! Devices send flat JSON objects. Every vital is kept as an untyped JSON
//! value until it is parsed into a [`FieldValue`], so a non-numeric value can
//! be reported as a format error on the reading instead of failing the whole
//! request.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::model::UserId;

/// Presence of a single payload field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<T> {
    /// Missing or `null`.
    Absent,
    /// Present but not a usable number.
    Malformed,
    Present(T),
}

impl<T: Copy> FieldValue<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            FieldValue::Present(v) => Some(*v),
            _ => None,
        }
    }
}

/// Parsed vital signs. Temperature is always °F.
#[derive(Debug, Clone, PartialEq)]
pub struct VitalSigns {
    pub body_temperature: FieldValue<f64>,
    pub pulse_rate: FieldValue<i32>,
    pub heart_rate: FieldValue<i32>,
    pub spo2: FieldValue<f64>,
    pub battery_level: FieldValue<f64>,
    pub blood_pressure_systolic: FieldValue<i32>,
    pub blood_pressure_diastolic: FieldValue<i32>,
    pub signal_strength: FieldValue<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Fahrenheit,
    Celsius,
}

impl TemperatureUnit {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().trim_start_matches('°').to_ascii_lowercase().as_str() {
            "f" | "fahrenheit" => Some(TemperatureUnit::Fahrenheit),
            "c" | "celsius" => Some(TemperatureUnit::Celsius),
            _ => None,
        }
    }

    pub fn to_fahrenheit(self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Fahrenheit => value,
            TemperatureUnit::Celsius => value * 9.0 / 5.0 + 32.0,
        }
    }
}

/// One reading as sent by a device.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawReading {
    pub user_id: Option<Value>,
    pub device_id: Option<Value>,
    pub body_temperature: Option<Value>,
    /// `"F"` (default) or `"C"`.
    pub temperature_unit: Option<Value>,
    pub pulse_rate: Option<Value>,
    pub heart_rate: Option<Value>,
    pub spo2: Option<Value>,
    pub blood_pressure_systolic: Option<Value>,
    pub blood_pressure_diastolic: Option<Value>,
    pub battery_level: Option<Value>,
    pub signal_strength: Option<Value>,
    /// Device-local capture time for readings uploaded after an offline period.
    pub recorded_at: Option<Value>,
    pub is_offline_data: Option<Value>,
    pub notes: Option<Value>,
    pub symptoms: Option<Value>,
}

impl RawReading {
    /// Decodes one reading. Anything but a JSON object is malformed.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::MalformedPayload(format!(
                "expected a reading object, got {}",
                json_kind(&value)
            )));
        }
        serde_json::from_value(value).map_err(|e| Error::MalformedPayload(e.to_string()))
    }

    pub fn user_id(&self) -> Result<UserId> {
        parse_user_id(self.user_id.as_ref())
    }

    pub fn vitals(&self) -> VitalSigns {
        VitalSigns {
            body_temperature: self.body_temperature_fahrenheit(),
            pulse_rate: parse_int(self.pulse_rate.as_ref()),
            heart_rate: parse_int(self.heart_rate.as_ref()),
            spo2: parse_float(self.spo2.as_ref()),
            battery_level: parse_float(self.battery_level.as_ref()),
            blood_pressure_systolic: parse_int(self.blood_pressure_systolic.as_ref()),
            blood_pressure_diastolic: parse_int(self.blood_pressure_diastolic.as_ref()),
            signal_strength: parse_int(self.signal_strength.as_ref()),
        }
    }

    fn body_temperature_fahrenheit(&self) -> FieldValue<f64> {
        let unit = match &self.temperature_unit {
            None | Some(Value::Null) => TemperatureUnit::Fahrenheit,
            Some(Value::String(raw)) => match TemperatureUnit::parse(raw) {
                Some(unit) => unit,
                None => {
                    debug!("Unsupported temperature unit {:?}", raw);
                    return malformed_unless_absent(self.body_temperature.as_ref());
                }
            },
            Some(other) => {
                debug!("Unsupported temperature unit {}", other);
                return malformed_unless_absent(self.body_temperature.as_ref());
            }
        };

        match (unit, parse_float(self.body_temperature.as_ref())) {
            (TemperatureUnit::Celsius, FieldValue::Present(value)) => {
                FieldValue::Present(round_tenth(unit.to_fahrenheit(value)))
            }
            (_, other) => other,
        }
    }

    pub fn device_id(&self) -> Option<String> {
        text(self.device_id.as_ref())
    }

    /// Parsed leniently: a malformed timestamp leaves the field unset.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        match &self.recorded_at {
            Some(Value::String(raw)) => parse_timestamp(raw),
            None | Some(Value::Null) => None,
            Some(other) => {
                debug!("Ignoring non-string recorded_at {}", other);
                None
            }
        }
    }

    pub fn is_offline_data(&self) -> bool {
        matches!(self.is_offline_data, Some(Value::Bool(true)))
    }

    pub fn notes(&self) -> Option<String> {
        text(self.notes.as_ref())
    }

    pub fn symptoms(&self) -> Option<String> {
        text(self.symptoms.as_ref())
    }
}

/// Offline buffer upload: a shared user and device applied to every item.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BatchUpload {
    pub user_id: Option<Value>,
    pub device_id: Option<Value>,
    pub readings: Option<Vec<Value>>,
}

impl BatchUpload {
    pub fn user_id(&self) -> Result<UserId> {
        parse_user_id(self.user_id.as_ref())
    }

    pub fn device_id(&self) -> Option<String> {
        text(self.device_id.as_ref())
    }
}

fn parse_user_id(value: Option<&Value>) -> Result<UserId> {
    match value {
        None | Some(Value::Null) => Err(Error::MissingUserId),
        Some(value) => match parse_int::<i64>(Some(value)) {
            FieldValue::Present(id) => Ok(id),
            _ => Err(Error::MalformedPayload(format!("invalid user_id {value}"))),
        },
    }
}

pub fn parse_float(value: Option<&Value>) -> FieldValue<f64> {
    let parsed = match value {
        None | Some(Value::Null) => return FieldValue::Absent,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => FieldValue::Present(v),
        _ => FieldValue::Malformed,
    }
}

pub fn parse_int<T: TryFrom<i64>>(value: Option<&Value>) -> FieldValue<T> {
    let parsed = match value {
        None | Some(Value::Null) => return FieldValue::Absent,
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    match parsed.and_then(|v| T::try_from(v).ok()) {
        Some(v) => FieldValue::Present(v),
        None => FieldValue::Malformed,
    }
}

/// Accepts RFC 3339 (including a trailing `Z`) and naive ISO-8601 timestamps,
/// the latter taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    debug!("Ignoring malformed recorded_at {:?}", raw);
    None
}

fn malformed_unless_absent(value: Option<&Value>) -> FieldValue<f64> {
    match value {
        None | Some(Value::Null) => FieldValue::Absent,
        Some(_) => FieldValue::Malformed,
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
