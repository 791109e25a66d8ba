//! Stream client: owner of the live device connection
//!
//! Holds at most one link at a time. `connect` validates the address and
//! spawns a reader task; the task opens the link, parses each inbound message
//! and calls every subscriber synchronously, in arrival order, before reading
//! the next one. Malformed frames are logged and skipped without touching the
//! connection.
//!
//! ```text
//! Idle ─connect─▶ Connecting ─opened─▶ Open ─┬─ device close ─▶ Closed
//!                     │                       └─ transport error ─▶ Errored
//!                     └─ transport error ─▶ Errored
//! Closed / Errored ─connect─▶ Connecting        (any) ─disconnect─▶ Closed
//! ```
//!
//! There is no automatic reconnect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::transport::{DeviceConnector, DeviceLink, LinkMessage};
use super::{DeviceAddress, StreamError, CONNECT_FAILED_MESSAGE, DEFAULT_DEVICE_PORT};
use crate::types::{DeviceFrame, FrameEvent};

/// Connection lifecycle of the stream client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Observable status: the state plus the diagnostic for `Errored`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: ConnectionState,
    pub diagnostic: Option<String>,
    /// Bumped on every connect/disconnect so stale reader tasks can't publish.
    generation: u64,
}

type FrameCallback = Arc<dyn Fn(&FrameEvent) + Send + Sync>;

struct Shared {
    status_tx: watch::Sender<LinkStatus>,
    subscribers: Mutex<HashMap<Uuid, FrameCallback>>,
}

impl Shared {
    /// Publish a transition if `generation` is still the current connection.
    fn publish(&self, generation: u64, state: ConnectionState, diagnostic: Option<String>) -> bool {
        self.status_tx.send_if_modified(|status| {
            if status.generation != generation {
                return false;
            }
            status.state = state;
            status.diagnostic = diagnostic;
            true
        })
    }

    fn is_current(&self, generation: u64) -> bool {
        self.status_tx.borrow().generation == generation
    }

    fn dispatch(&self, generation: u64, payload: &[u8]) {
        let frame = match DeviceFrame::parse(payload) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Dropping malformed frame ({} bytes): {}", payload.len(), e);
                return;
            }
        };
        if !self.is_current(generation) {
            return;
        }

        let event = FrameEvent::received_now(frame);
        let callbacks: Vec<FrameCallback> = match self.subscribers.lock() {
            Ok(subs) => subs.values().cloned().collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(&event);
        }
    }
}

struct ActiveLink {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Client for one sensor device connection.
pub struct StreamClient {
    connector: Arc<dyn DeviceConnector>,
    default_port: u16,
    connect_timeout: Option<Duration>,
    shared: Arc<Shared>,
    active: Mutex<Option<ActiveLink>>,
}

impl StreamClient {
    pub fn new(connector: Arc<dyn DeviceConnector>) -> Self {
        let (status_tx, _) = watch::channel(LinkStatus {
            state: ConnectionState::Idle,
            diagnostic: None,
            generation: 0,
        });

        Self {
            connector,
            default_port: DEFAULT_DEVICE_PORT,
            connect_timeout: None,
            shared: Arc::new(Shared {
                status_tx,
                subscribers: Mutex::new(HashMap::new()),
            }),
            active: Mutex::new(None),
        }
    }

    /// Port used when the address names only a host.
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Give up on a connection attempt that has not opened after `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.status_tx.borrow().state
    }

    pub fn status(&self) -> LinkStatus {
        self.shared.status_tx.borrow().clone()
    }

    /// Watch status transitions.
    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Register a frame callback. It runs on the reader task, once per parsed frame.
    pub fn subscribe(&self, callback: Box<dyn Fn(&FrameEvent) + Send + Sync>) -> Uuid {
        let id = Uuid::new_v4();
        if let Ok(mut subs) = self.shared.subscribers.lock() {
            subs.insert(id, Arc::from(callback));
        }
        log::debug!("Frame subscriber {} registered", id);
        id
    }

    /// Remove a frame callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, subscription_id: Uuid) -> bool {
        let removed = self
            .shared
            .subscribers
            .lock()
            .map(|mut subs| subs.remove(&subscription_id).is_some())
            .unwrap_or(false);
        if removed {
            log::debug!("Frame subscriber {} removed", subscription_id);
        }
        removed
    }

    /// Open a connection to `address`, replacing any existing one.
    ///
    /// An empty or malformed address fails with `InvalidAddress` and leaves the
    /// state untouched. Otherwise the state moves to `Connecting` immediately and
    /// the outcome is published through `watch_status`. Must be called from
    /// within a tokio runtime.
    pub fn connect(&self, address: &str) -> Result<(), StreamError> {
        let address = DeviceAddress::parse(address, self.default_port)?;

        let mut active = self
            .active
            .lock()
            .map_err(|_| StreamError::Transport("client state poisoned".into()))?;
        if let Some(previous) = active.take() {
            let _ = previous.shutdown.send(());
        }

        let mut generation = 0;
        self.shared.status_tx.send_modify(|status| {
            status.generation += 1;
            status.state = ConnectionState::Connecting;
            status.diagnostic = None;
            generation = status.generation;
        });

        log::info!("Connecting to device at {}", address);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_link(
            Arc::clone(&self.shared),
            Arc::clone(&self.connector),
            address,
            generation,
            self.connect_timeout,
            shutdown_rx,
        ));
        *active = Some(ActiveLink {
            shutdown: shutdown_tx,
            task,
        });
        Ok(())
    }

    /// Close the connection if there is one. Always leaves the state `Closed`.
    pub fn disconnect(&self) {
        let previous = self.active.lock().ok().and_then(|mut a| a.take());

        self.shared.status_tx.send_modify(|status| {
            status.generation += 1;
            status.state = ConnectionState::Closed;
            status.diagnostic = None;
        });

        if let Some(previous) = previous {
            log::info!("Disconnecting from device");
            let _ = previous.shutdown.send(());
        }
    }

    /// Whether a reader task is still running.
    pub fn has_active_link(&self) -> bool {
        self.active
            .lock()
            .map(|a| a.as_ref().map_or(false, |link| !link.task.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().ok().and_then(|a| a.take()) {
            let _ = active.shutdown.send(());
        }
    }
}

async fn open_link(
    connector: &dyn DeviceConnector,
    address: &DeviceAddress,
    timeout: Option<Duration>,
) -> Result<Box<dyn DeviceLink>, StreamError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, connector.open(address))
            .await
            .map_err(|_| StreamError::Transport(format!("no answer from {} within {:?}", address, limit)))?,
        None => connector.open(address).await,
    }
}

async fn run_link(
    shared: Arc<Shared>,
    connector: Arc<dyn DeviceConnector>,
    address: DeviceAddress,
    generation: u64,
    timeout: Option<Duration>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let opened = tokio::select! {
        biased;
        _ = &mut shutdown => return,
        result = open_link(connector.as_ref(), &address, timeout) => result,
    };

    let mut link = match opened {
        Ok(link) => link,
        Err(e) => {
            log::warn!("Connection to {} failed: {}", address, e);
            shared.publish(generation, ConnectionState::Errored, Some(CONNECT_FAILED_MESSAGE.to_string()));
            return;
        }
    };

    if !shared.publish(generation, ConnectionState::Open, None) {
        // Superseded while the connection was opening
        let _ = link.close().await;
        return;
    }
    log::info!("Connected to device at {}", address);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                if let Err(e) = link.close().await {
                    log::debug!("Error closing link to {}: {}", address, e);
                }
                log::info!("Disconnected from device at {}", address);
                return;
            }
            message = link.recv() => match message {
                Ok(LinkMessage::Payload(payload)) => shared.dispatch(generation, &payload),
                Ok(LinkMessage::Closed) => {
                    log::info!("Device at {} closed the connection", address);
                    shared.publish(generation, ConnectionState::Closed, None);
                    return;
                }
                Err(e) => {
                    log::warn!("Link to {} failed: {}", address, e);
                    shared.publish(generation, ConnectionState::Errored, Some(CONNECT_FAILED_MESSAGE.to_string()));
                    return;
                }
            }
        }
    }
}
