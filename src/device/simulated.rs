//! In-process device simulator
//!
//! A `SimDevice` acts as a connector whose links are fed by the test through
//! channels: push frames, inject garbage, fail the transport or hang up, all
//! without a network. Used for testing the stream client and dashboard.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::transport::{DeviceConnector, DeviceLink, LinkMessage};
use super::{DeviceAddress, StreamError};
use crate::types::DeviceFrame;

enum SimEvent {
    Payload(Vec<u8>),
    Fail(String),
    HangUp,
}

/// A simulated sensor device.
pub struct SimDevice {
    reachable: AtomicBool,
    /// Delay before `open` resolves. Uses tokio time, so paused clocks skip it.
    open_delay: Mutex<Duration>,
    /// Sender for the currently attached link, if any.
    current: Mutex<Option<mpsc::UnboundedSender<SimEvent>>>,
    /// Addresses passed to `open`, in order.
    opened: Mutex<Vec<String>>,
    closed_by_client: Arc<AtomicUsize>,
}

impl SimDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(true),
            open_delay: Mutex::new(Duration::ZERO),
            current: Mutex::new(None),
            opened: Mutex::new(Vec::new()),
            closed_by_client: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Make subsequent connection attempts fail (or succeed again).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_open_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.open_delay.lock() {
            *d = delay;
        }
    }

    /// Send a well-formed frame. Returns false if no link is attached.
    pub fn send_frame(&self, frame: &DeviceFrame) -> bool {
        match serde_json::to_vec(frame) {
            Ok(bytes) => self.emit(SimEvent::Payload(bytes)),
            Err(_) => false,
        }
    }

    /// Send an arbitrary text payload, well-formed or not.
    pub fn send_text(&self, text: &str) -> bool {
        self.emit(SimEvent::Payload(text.as_bytes().to_vec()))
    }

    pub fn send_bytes(&self, bytes: &[u8]) -> bool {
        self.emit(SimEvent::Payload(bytes.to_vec()))
    }

    /// Break the attached link with a transport error.
    pub fn fail(&self, reason: &str) -> bool {
        let sent = self.emit(SimEvent::Fail(reason.to_string()));
        self.detach();
        sent
    }

    /// Close the attached link from the device side.
    pub fn hang_up(&self) -> bool {
        let sent = self.emit(SimEvent::HangUp);
        self.detach();
        sent
    }

    /// Whether a link is attached and the client has not closed it.
    pub fn is_attached(&self) -> bool {
        self.current
            .lock()
            .map(|c| c.as_ref().map_or(false, |tx| !tx.is_closed()))
            .unwrap_or(false)
    }

    /// Number of successful and failed `open` calls.
    pub fn open_count(&self) -> usize {
        self.opened.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn opened_addresses(&self) -> Vec<String> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// How many links the client closed from its side.
    pub fn closed_by_client(&self) -> usize {
        self.closed_by_client.load(Ordering::SeqCst)
    }

    fn emit(&self, event: SimEvent) -> bool {
        match self.current.lock() {
            Ok(current) => current.as_ref().map_or(false, |tx| tx.send(event).is_ok()),
            Err(_) => false,
        }
    }

    fn detach(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}

#[async_trait]
impl DeviceConnector for SimDevice {
    async fn open(&self, address: &DeviceAddress) -> Result<Box<dyn DeviceLink>, StreamError> {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(address.url().to_string());
        }

        let delay = self.open_delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(StreamError::Transport(format!(
                "connection refused by {}",
                address
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut current) = self.current.lock() {
            // A new link replaces whatever was attached before
            *current = Some(tx);
        }

        Ok(Box::new(SimLink {
            rx,
            closed: false,
            closed_by_client: Arc::clone(&self.closed_by_client),
        }))
    }
}

struct SimLink {
    rx: mpsc::UnboundedReceiver<SimEvent>,
    closed: bool,
    closed_by_client: Arc<AtomicUsize>,
}

#[async_trait]
impl DeviceLink for SimLink {
    async fn recv(&mut self) -> Result<LinkMessage, StreamError> {
        if self.closed {
            return Ok(LinkMessage::Closed);
        }
        match self.rx.recv().await {
            Some(SimEvent::Payload(bytes)) => Ok(LinkMessage::Payload(bytes)),
            Some(SimEvent::Fail(reason)) => Err(StreamError::Transport(reason)),
            Some(SimEvent::HangUp) | None => Ok(LinkMessage::Closed),
        }
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        if !self.closed {
            self.closed = true;
            self.rx.close();
            self.closed_by_client.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
