//! Bounded recency buffer for display.
//!
//! A `HistoryWindow` keeps the last `capacity` entries in arrival order and
//! evicts from the front once full. Reading never reorders entries.

use std::collections::VecDeque;

use thiserror::Error;

/// Default number of readings kept: 30 seconds at the device's 0.5 s cadence.
pub const DEFAULT_CAPACITY: usize = 60;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WindowError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Fixed-capacity FIFO window over recent entries.
#[derive(Clone, Debug)]
pub struct HistoryWindow<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> HistoryWindow<T> {
    /// Create an empty window. A zero capacity is rejected.
    pub fn new(capacity: usize) -> Result<Self, WindowError> {
        if capacity == 0 {
            return Err(WindowError::InvalidArgument(
                "history capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Append an entry, evicting the oldest one when the window is full.
    pub fn push(&mut self, entry: T) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// The most recent `limit` entries, oldest first.
    pub fn snapshot(&self, limit: usize) -> Vec<T> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
