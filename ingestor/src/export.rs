//! CSV rendering of stored readings.

use std::fmt::Display;

use crate::model::Reading;

pub const HEADER: [&str; 11] = [
    "ID",
    "User ID",
    "Date",
    "Time",
    "Body Temperature (°F)",
    "Pulse Rate (bpm)",
    "Heart Rate (bpm)",
    "SpO2 (%)",
    "Blood Pressure",
    "Battery (%)",
    "Valid",
];

/// One header line, then one line per reading in the given order.
pub fn to_csv(readings: &[Reading]) -> String {
    let mut out = HEADER.join(",");
    out.push('\n');

    for r in readings {
        let row = [
            r.id.to_string(),
            r.user_id.to_string(),
            r.timestamp.format("%Y-%m-%d").to_string(),
            r.timestamp.format("%H:%M:%S").to_string(),
            cell(r.body_temperature),
            cell(r.pulse_rate),
            cell(r.heart_rate),
            cell(r.spo2),
            r.blood_pressure().unwrap_or_default(),
            cell(r.battery_level),
            if r.is_valid { "Yes" } else { "No" }.to_string(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn cell<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
