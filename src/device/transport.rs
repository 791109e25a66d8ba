//! Device transport trait definitions
//!
//! Defines the abstract link the stream client reads from. The WebSocket
//! transport talks to real firmware; the simulated transport backs tests.

use async_trait::async_trait;

use super::{DeviceAddress, StreamError};

/// One unit delivered by a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMessage {
    /// A complete message body (text or binary) holding one frame.
    Payload(Vec<u8>),
    /// The device ended the connection cleanly.
    Closed,
}

/// An open connection to a device.
#[async_trait]
pub trait DeviceLink: Send {
    /// Wait for the next message. Must be cancel-safe.
    async fn recv(&mut self) -> Result<LinkMessage, StreamError>;

    /// Close the connection from our side.
    async fn close(&mut self) -> Result<(), StreamError>;
}

/// Opens links to device addresses.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn open(&self, address: &DeviceAddress) -> Result<Box<dyn DeviceLink>, StreamError>;
}
