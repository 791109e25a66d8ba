//! Fire-and-forget forwarding of readings to a store.
//!
//! `forward` spawns the write and returns immediately. The spawned task is the
//! only place a write result is observed: failures are logged there and never
//! retried, queued or reported back. Losing a sample is acceptable; stalling
//! the live display is not.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::{PersistenceError, ReadingStore};
use crate::session::Credential;
use crate::types::Reading;

#[derive(Clone)]
pub struct PersistenceForwarder {
    store: Arc<dyn ReadingStore>,
}

impl PersistenceForwarder {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self { store }
    }

    /// Issue the write for one reading without waiting for it.
    ///
    /// Must be called from within a tokio runtime. The returned handle may be
    /// awaited or dropped; dropping it does not cancel the write.
    pub fn forward(&self, reading: Reading, credential: Option<Credential>) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let result = match credential {
                Some(credential) => store.write(&reading, &credential).await,
                None => Err(PersistenceError::MissingCredential),
            };
            if let Err(e) = result {
                log::warn!(
                    "Dropping reading taken at {} for user {}: {}",
                    reading.timestamp(),
                    reading.user_id(),
                    e
                );
            }
        })
    }
}
