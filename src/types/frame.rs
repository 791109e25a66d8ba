//! types/frame.rs
//!
//! The device's wire message and the event the stream client emits for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message from the sensor device, before it becomes a `Reading`.
///
/// Wire shape: `{ heartRate, beatAvg, spo2, fingerDetected, irValue }`.
/// The three vitals are required; the rest default when absent. Anything else
/// the firmware sends, a `millis()` counter included, is ignored: readings are
/// stamped with the receive time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFrame {
    pub heart_rate: f64,
    pub beat_avg: f64,
    pub spo2: f64,
    #[serde(default)]
    pub finger_detected: bool,
    #[serde(default)]
    pub ir_value: f64,
}

impl DeviceFrame {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// A successfully parsed frame plus the wall-clock time it was received.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameEvent {
    pub frame: DeviceFrame,
    pub received_at: DateTime<Utc>,
}

impl FrameEvent {
    pub fn received_now(frame: DeviceFrame) -> Self {
        Self {
            frame,
            received_at: Utc::now(),
        }
    }
}

/// Latest values shown on the live cards.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveVitals {
    pub heart_rate: f64,
    pub avg_heart_rate: f64,
    pub spo2: f64,
    pub finger_detected: bool,
    pub ir_value: f64,
    pub received_at: DateTime<Utc>,
}

impl From<&FrameEvent> for LiveVitals {
    fn from(event: &FrameEvent) -> Self {
        Self {
            heart_rate: event.frame.heart_rate,
            avg_heart_rate: event.frame.beat_avg,
            spo2: event.frame.spo2,
            finger_detected: event.frame.finger_detected,
            ir_value: event.frame.ir_value,
            received_at: event.received_at,
        }
    }
}
