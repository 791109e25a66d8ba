//! In-memory reading store
//!
//! Records every write it accepts. Can be switched to fail every write, which
//! is how the isolation of the live path from persistence is exercised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{PersistenceError, ReadingStore};
use crate::session::Credential;
use crate::types::Reading;

#[derive(Default)]
pub struct MemoryStore {
    writes: Mutex<Vec<(Reading, String)>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every write.
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Accepted readings, in completion order.
    pub fn readings(&self) -> Vec<Reading> {
        self.writes
            .lock()
            .map(|w| w.iter().map(|(r, _)| r.clone()).collect())
            .unwrap_or_default()
    }

    /// Bearer tokens seen with each accepted write.
    pub fn tokens(&self) -> Vec<String> {
        self.writes
            .lock()
            .map(|w| w.iter().map(|(_, t)| t.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.writes.lock().map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn write(&self, reading: &Reading, credential: &Credential) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Network("store unavailable".into()));
        }
        let mut writes = self
            .writes
            .lock()
            .map_err(|_| PersistenceError::Network("store lock poisoned".into()))?;
        writes.push((reading.clone(), credential.token().to_string()));
        Ok(())
    }
}
