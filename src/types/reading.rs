//! types/reading.rs
//!
//! Defines the Reading record: one normalized sensor sample owned by a user account.
//! This is the unit the history window displays and the reading store persists.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::frame::FrameEvent;

/// Opaque identifier of the account that owns a reading.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One sensor sample.
///
/// Values are stored as reported by the device; no plausibility checks are applied.
/// Serializes to the reading store's wire shape:
/// `{ userId, heartRate, avgHeartRate, spo2, timestamp }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    user_id: UserId,
    heart_rate: f64,
    avg_heart_rate: f64,
    spo2: f64,
    /// Capture instant. Records decoded without one take the decode time.
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(
        user_id: UserId,
        heart_rate: f64,
        avg_heart_rate: f64,
        spo2: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            heart_rate,
            avg_heart_rate,
            spo2,
            timestamp,
        }
    }

    /// Build the reading for one inbound frame, stamped with its receive time.
    pub fn from_frame(user_id: UserId, event: &FrameEvent) -> Self {
        let frame = &event.frame;
        Self::new(
            user_id,
            frame.heart_rate,
            frame.beat_avg,
            frame.spo2,
            event.received_at,
        )
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn heart_rate(&self) -> f64 {
        self.heart_rate
    }

    pub fn avg_heart_rate(&self) -> f64 {
        self.avg_heart_rate
    }

    pub fn spo2(&self) -> f64 {
        self.spo2
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
