//! Dashboard configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::DashboardError;
use crate::device::DEFAULT_DEVICE_PORT;
use crate::history::DEFAULT_CAPACITY;
use crate::persistence::http::DEFAULT_ENDPOINT;

/// Configuration for a dashboard session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DashboardConfig {
    /// Port appended when the user enters a bare host
    pub device_port: u16,

    /// Readings kept in the history window
    pub history_capacity: usize,

    /// Rows in the recent-readings table
    pub table_rows: usize,

    /// Reading store write endpoint
    pub store_url: String,

    /// Give up on a connection attempt after this many milliseconds
    pub connect_timeout_ms: Option<u64>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            device_port: DEFAULT_DEVICE_PORT,
            history_capacity: DEFAULT_CAPACITY,
            table_rows: 10,
            store_url: DEFAULT_ENDPOINT.to_string(),
            connect_timeout_ms: None,
        }
    }
}

impl DashboardConfig {
    /// Load overrides from a JSON file. Absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DashboardError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DashboardError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| DashboardError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DashboardError> {
        if self.history_capacity == 0 {
            return Err(DashboardError::Config("historyCapacity must be at least 1".into()));
        }
        if self.table_rows == 0 {
            return Err(DashboardError::Config("tableRows must be at least 1".into()));
        }
        if self.store_url.trim().is_empty() {
            return Err(DashboardError::Config("storeUrl is empty".into()));
        }
        if self.device_port == 0 {
            return Err(DashboardError::Config("devicePort must be non-zero".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}
