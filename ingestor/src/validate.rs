use crate::config::{Range, ValidationBounds};
use crate::model::ValidationErrors;
use crate::payload::{FieldValue, VitalSigns};

const BATTERY: Range<f64> = Range::new(0.0, 100.0);

/// Devices report 0 bpm when no finger is on the sensor.
const NO_CONTACT_BPM: i32 = 0;

/// Outcome of validating one reading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validation {
    pub is_valid: bool,
    pub errors: ValidationErrors,
}

/// Validates vital signs against physiological bounds.
///
/// Never rejects a reading: every problem is reported as a per-field
/// annotation and the reading is valid only when there are none.
pub fn validate(vitals: &VitalSigns, bounds: &ValidationBounds) -> Validation {
    let mut errors = ValidationErrors::new();

    // Required vitals
    check_temperature(&mut errors, vitals.body_temperature, bounds.body_temperature);
    check_bpm(&mut errors, "pulse_rate", "Pulse", vitals.pulse_rate, bounds.pulse_rate);
    check_bpm(&mut errors, "heart_rate", "Heart rate", vitals.heart_rate, bounds.heart_rate);

    // Optional vitals
    match vitals.spo2 {
        FieldValue::Absent => {}
        FieldValue::Malformed => {
            errors.insert("spo2".into(), "Invalid SpO2 format".into());
        }
        FieldValue::Present(spo2) if !bounds.spo2.contains(spo2) => {
            errors.insert("spo2".into(), out_of_range("SpO2", spo2, "%", bounds.spo2));
        }
        FieldValue::Present(_) => {}
    }

    match vitals.battery_level {
        FieldValue::Absent => {}
        FieldValue::Malformed => {
            errors.insert("battery_level".into(), "Invalid battery level format".into());
        }
        FieldValue::Present(battery) if !BATTERY.contains(battery) => {
            errors.insert(
                "battery_level".into(),
                out_of_range("Battery level", battery, "%", BATTERY),
            );
        }
        FieldValue::Present(_) => {}
    }

    // Format only
    for (field, value) in [
        ("blood_pressure_systolic", vitals.blood_pressure_systolic),
        ("blood_pressure_diastolic", vitals.blood_pressure_diastolic),
        ("signal_strength", vitals.signal_strength),
    ] {
        if value == FieldValue::Malformed {
            errors.insert(field.into(), format!("Invalid {} format", field.replace('_', " ")));
        }
    }

    Validation {
        is_valid: errors.is_empty(),
        errors,
    }
}

fn check_temperature(errors: &mut ValidationErrors, value: FieldValue<f64>, range: Range<f64>) {
    let field = "body_temperature";
    match value {
        FieldValue::Absent => {
            errors.insert(field.into(), required(field));
        }
        FieldValue::Malformed => {
            errors.insert(field.into(), "Invalid temperature format".into());
        }
        FieldValue::Present(temp) if !range.contains(temp) => {
            errors.insert(field.into(), out_of_range("Temperature", temp, "°F", range));
        }
        FieldValue::Present(_) => {}
    }
}

fn check_bpm(
    errors: &mut ValidationErrors,
    field: &str,
    label: &str,
    value: FieldValue<i32>,
    range: Range<i32>,
) {
    match value {
        FieldValue::Absent => {
            errors.insert(field.into(), required(field));
        }
        FieldValue::Malformed => {
            errors.insert(field.into(), format!("Invalid {} format", label.to_lowercase()));
        }
        FieldValue::Present(NO_CONTACT_BPM) => {
            errors.insert(field.into(), format!("{label} not measured (no sensor contact)"));
        }
        FieldValue::Present(bpm) if !range.contains(bpm) => {
            errors.insert(field.into(), out_of_range(label, bpm, " bpm", range));
        }
        FieldValue::Present(_) => {}
    }
}

fn required(field: &str) -> String {
    format!("{field} is required")
}

fn out_of_range<T: std::fmt::Display>(label: &str, value: T, unit: &str, range: Range<T>) -> String {
    format!(
        "{label} {value}{unit} out of valid range ({}-{})",
        range.min, range.max
    )
}
