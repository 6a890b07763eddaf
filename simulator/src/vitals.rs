use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

/// Reading in the shape the ingestor accepts. Temperatures are sent in °C
/// with an explicit unit, like the wrist devices do.
#[derive(Debug, Clone, Serialize)]
pub struct VitalReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub device_id: String,
    pub body_temperature: Option<f64>,
    pub temperature_unit: &'static str,
    pub pulse_rate: Option<i32>,
    pub heart_rate: Option<i32>,
    pub spo2: Option<f64>,
    pub battery_level: f64,
    pub signal_strength: i32,
    pub recorded_at: DateTime<Utc>,
    pub is_offline_data: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchUpload {
    pub user_id: i64,
    pub device_id: String,
    pub readings: Vec<VitalReading>,
}

#[derive(Debug)]
pub struct Device {
    pub id: String,
    pub user_id: i64,
    pub battery: f64,
    pub offline: bool,
    pub buffer: Vec<VitalReading>,
}

impl Device {
    pub fn new(id: String, user_id: i64, rng: &mut impl Rng) -> Self {
        Self {
            id,
            user_id,
            battery: rng.gen_range(40.0..100.0),
            offline: false,
            buffer: Vec::new(),
        }
    }

    /// Next synthetic reading. Drains the battery a little each time and
    /// recharges it once it runs flat.
    pub fn sample(&mut self, rng: &mut impl Rng) -> VitalReading {
        self.battery -= rng.gen_range(0.05..0.3);
        if self.battery <= 0.0 {
            self.battery = 100.0;
        }

        let temperature = if rng.gen_bool(0.05) {
            rng.gen_range(37.8..40.5) // fever
        } else if rng.gen_bool(0.01) {
            rng.gen_range(30.0..45.0) // sensor glitch
        } else {
            rng.gen_range(36.1..37.4)
        };

        // No finger on the sensor reads as 0 bpm
        let no_contact = rng.gen_bool(0.03);
        let pulse = if no_contact {
            0
        } else if rng.gen_bool(0.05) {
            rng.gen_range(120..160)
        } else {
            rng.gen_range(55..100)
        };
        let heart_rate = if no_contact { 0 } else { pulse + rng.gen_range(-3..=3) };

        let spo2 = if rng.gen_bool(0.03) {
            rng.gen_range(82.0..90.0)
        } else {
            rng.gen_range(94.0..100.0)
        };

        VitalReading {
            user_id: (!self.offline).then_some(self.user_id),
            device_id: self.id.clone(),
            body_temperature: Some(round_tenth(temperature)),
            temperature_unit: "C",
            pulse_rate: Some(pulse),
            heart_rate: Some(heart_rate),
            spo2: Some(round_tenth(spo2)),
            battery_level: round_tenth(self.battery),
            signal_strength: rng.gen_range(-90..-40),
            recorded_at: Utc::now(),
            is_offline_data: self.offline,
        }
    }

    /// Empties the offline buffer into one upload.
    pub fn drain_batch(&mut self) -> Option<BatchUpload> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(BatchUpload {
            user_id: self.user_id,
            device_id: self.id.clone(),
            readings: std::mem::take(&mut self.buffer),
        })
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
