//! Text rendering for the live cards and the recent-readings table.

use chrono::Local;
use serde::Serialize;

use crate::device::ConnectionState;
use crate::types::Reading;

/// Placeholder for a value the device has not measured yet.
pub const PLACEHOLDER: &str = "--";

/// A measurement as shown to the user. Zero means "no reading" on the device.
pub fn format_value(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return PLACEHOLDER.to_string();
    }
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

pub fn format_bpm(value: f64) -> String {
    format!("{} BPM", format_value(value))
}

pub fn format_percent(value: f64) -> String {
    format!("{}%", format_value(value))
}

pub fn finger_status(detected: bool) -> &'static str {
    if detected {
        "Finger Detected"
    } else {
        "No Finger Detected"
    }
}

pub fn connection_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Open => "Connected to ESP32",
        ConnectionState::Connecting => "Connecting",
        _ => "Disconnected",
    }
}

/// One row of the recent-readings table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadingRow {
    pub time: String,
    pub heart_rate: String,
    pub avg_heart_rate: String,
    pub spo2: String,
}

impl From<&Reading> for ReadingRow {
    fn from(reading: &Reading) -> Self {
        Self {
            time: reading.timestamp().with_timezone(&Local).format("%H:%M:%S").to_string(),
            heart_rate: format_value(reading.heart_rate()),
            avg_heart_rate: format_value(reading.avg_heart_rate()),
            spo2: format_value(reading.spo2()),
        }
    }
}
