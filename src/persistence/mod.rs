//! Best-effort persistence of readings
//!
//! Every reading is handed to a `ReadingStore` exactly once through the
//! `PersistenceForwarder`. Writes run detached from the live path and their
//! failures are logged and dropped.

pub mod forwarder;
pub mod http;
pub mod memory;

pub use forwarder::PersistenceForwarder;
pub use http::HttpReadingStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::Credential;
use crate::types::Reading;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Store rejected reading with status {status}")]
    Rejected { status: u16 },

    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("No credential available for the current session")]
    MissingCredential,
}

/// Durable destination for readings.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Write one reading, authorized by `credential`.
    async fn write(&self, reading: &Reading, credential: &Credential) -> Result<(), PersistenceError>;
}
