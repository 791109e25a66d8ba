//! Dashboard controller
//!
//! Ties one `StreamClient` to a history window and the persistence forwarder
//! for a signed-in user. Every parsed frame becomes a `Reading` that is pushed
//! into the window and handed to the forwarder, in that order, on the reader
//! task. The forwarder never blocks the push and its failures never reach the
//! window or the connection state.

pub mod config;
pub mod display;

pub use config::DashboardConfig;
pub use display::ReadingRow;

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::device::{ConnectionState, DeviceAddress, DeviceConnector, LinkStatus, StreamClient, StreamError};
use crate::history::HistoryWindow;
use crate::persistence::{PersistenceForwarder, ReadingStore};
use crate::session::{SessionGate, UserIdentity};
use crate::types::{FrameEvent, LiveVitals, Reading, UserId};

/// Prompt shown when connect is pressed with no address.
pub const ENTER_ADDRESS_MESSAGE: &str = "Enter the device IP address";

/// Prefix of the message shown for an address that cannot be used.
pub const BAD_ADDRESS_MESSAGE: &str = "Not a valid device address";

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    #[error("No user is signed in")]
    SignedOut,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

/// State that lives only while a session is connected.
#[derive(Default)]
struct LiveSession {
    window: Option<HistoryWindow<Reading>>,
    vitals: Option<LiveVitals>,
    /// Writes spawned for this session that may still be running.
    pending: Vec<JoinHandle<()>>,
    /// Bumped on every subscribe and teardown. A frame sink only writes while
    /// its epoch is current.
    epoch: u64,
}

pub struct Dashboard {
    config: DashboardConfig,
    client: StreamClient,
    session: Arc<dyn SessionGate>,
    forwarder: PersistenceForwarder,
    live: Arc<Mutex<LiveSession>>,
    subscription: Mutex<Option<Uuid>>,
    address: Mutex<Option<String>>,
    input_error: Mutex<Option<String>>,
}

impl Dashboard {
    pub fn new(
        config: DashboardConfig,
        connector: Arc<dyn DeviceConnector>,
        store: Arc<dyn ReadingStore>,
        session: Arc<dyn SessionGate>,
    ) -> Result<Self, DashboardError> {
        config.validate()?;

        let client = StreamClient::new(connector)
            .with_default_port(config.device_port)
            .with_connect_timeout(config.connect_timeout());

        Ok(Self {
            config,
            client,
            session,
            forwarder: PersistenceForwarder::new(store),
            live: Arc::new(Mutex::new(LiveSession::default())),
            subscription: Mutex::new(None),
            address: Mutex::new(None),
            input_error: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.session.current_user()
    }

    /// Set the address the next `connect` will use.
    pub fn set_address(&self, address: Option<String>) {
        if let Ok(mut current) = self.address.lock() {
            *current = address;
        }
    }

    /// Connect to the address set with `set_address`.
    pub fn connect(&self) -> Result<(), DashboardError> {
        let address = self.address.lock().ok().and_then(|a| a.clone());
        match address {
            Some(address) => self.connect_to(&address),
            None => Err(self.reject_address("no address entered".into(), ENTER_ADDRESS_MESSAGE.to_string())),
        }
    }

    /// Connect to `address` as the signed-in user.
    ///
    /// An empty or malformed address is rejected before anything changes. The
    /// history window created here is kept across reconnects until teardown.
    pub fn connect_to(&self, address: &str) -> Result<(), DashboardError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(self.reject_address("no address entered".into(), ENTER_ADDRESS_MESSAGE.to_string()));
        }
        if let Err(e) = DeviceAddress::parse(address, self.config.device_port) {
            return Err(match e {
                StreamError::InvalidAddress(reason) => {
                    let message = format!("{}: {}", BAD_ADDRESS_MESSAGE, reason);
                    self.reject_address(reason, message)
                }
                other => other.into(),
            });
        }

        let user = self.session.current_user().ok_or(DashboardError::SignedOut)?;

        let epoch = {
            let mut live = self.lock_live()?;
            if live.window.is_none() {
                live.window = Some(
                    HistoryWindow::new(self.config.history_capacity)
                        .map_err(|e| DashboardError::Config(e.to_string()))?,
                );
            }
            live.epoch += 1;
            live.epoch
        };

        self.replace_subscription(user.id, epoch);
        self.client.connect(address)?;
        self.set_input_error(None);
        Ok(())
    }

    /// Close the connection and discard the session's history.
    ///
    /// Writes already issued keep running. Safe to call at any time.
    pub fn disconnect(&self) {
        self.teardown();
    }

    /// Tear the session down, then sign out of the account.
    pub fn sign_out(&self) {
        self.teardown();
        self.session.logout();
        log::info!("Signed out");
    }

    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    pub fn is_connected(&self) -> bool {
        self.client.state() == ConnectionState::Open
    }

    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.client.watch_status()
    }

    /// Message for the user: the last input problem, else the connection diagnostic.
    pub fn error_message(&self) -> Option<String> {
        if let Some(message) = self.input_error.lock().ok().and_then(|e| e.clone()) {
            return Some(message);
        }
        let status = self.client.status();
        match status.state {
            ConnectionState::Errored => status.diagnostic,
            _ => None,
        }
    }

    /// Whole history window, oldest first. Empty when no session is live.
    pub fn history(&self) -> Vec<Reading> {
        self.live
            .lock()
            .ok()
            .and_then(|live| live.window.as_ref().map(|w| w.iter().cloned().collect()))
            .unwrap_or_default()
    }

    /// The `limit` most recent readings, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Reading> {
        self.live
            .lock()
            .ok()
            .and_then(|live| live.window.as_ref().map(|w| w.snapshot(limit)))
            .unwrap_or_default()
    }

    /// Rows for the recent-readings table.
    pub fn recent_rows(&self) -> Vec<ReadingRow> {
        self.recent(self.config.table_rows)
            .iter()
            .map(ReadingRow::from)
            .collect()
    }

    pub fn live_vitals(&self) -> Option<LiveVitals> {
        self.live.lock().ok().and_then(|live| live.vitals.clone())
    }

    /// Wait for every write issued so far in this session to finish.
    pub async fn settle_writes(&self) {
        let pending = match self.live.lock() {
            Ok(mut live) => std::mem::take(&mut live.pending),
            Err(_) => return,
        };
        for handle in pending {
            if let Err(e) = handle.await {
                log::debug!("Reading write task ended abnormally: {}", e);
            }
        }
    }

    /// Callback that records frames for `user_id` while `epoch` is current.
    ///
    /// The stream client may still be running a sink it has already cloned out
    /// of its subscriber map after teardown or a reconnect, so the epoch is
    /// checked under the same lock that guards the window.
    fn frame_sink(&self, user_id: UserId, epoch: u64) -> Box<dyn Fn(&FrameEvent) + Send + Sync> {
        let live = Arc::clone(&self.live);
        let session = Arc::clone(&self.session);
        let forwarder = self.forwarder.clone();

        Box::new(move |event: &FrameEvent| {
            let mut live = match live.lock() {
                Ok(live) => live,
                Err(_) => return,
            };
            if live.epoch != epoch {
                return;
            }
            let reading = Reading::from_frame(user_id.clone(), event);
            match live.window.as_mut() {
                Some(window) => window.push(reading.clone()),
                None => return,
            }
            live.vitals = Some(LiveVitals::from(event));

            let handle = forwarder.forward(reading, session.credential());
            live.pending.retain(|h| !h.is_finished());
            live.pending.push(handle);
        })
    }

    fn replace_subscription(&self, user_id: UserId, epoch: u64) {
        let id = self.client.subscribe(self.frame_sink(user_id, epoch));

        let previous = self.subscription.lock().ok().and_then(|mut s| s.replace(id));
        if let Some(previous) = previous {
            self.client.unsubscribe(previous);
        }
    }

    fn teardown(&self) {
        self.client.disconnect();
        if let Some(id) = self.subscription.lock().ok().and_then(|mut s| s.take()) {
            self.client.unsubscribe(id);
        }
        if let Ok(mut live) = self.live.lock() {
            live.epoch += 1;
            live.window = None;
            live.vitals = None;
            // Dropping a handle detaches the write, it does not cancel it
            live.pending.clear();
        }
        self.set_input_error(None);
    }

    fn reject_address(&self, reason: String, message: String) -> DashboardError {
        self.set_input_error(Some(message));
        DashboardError::InvalidAddress(reason)
    }

    fn set_input_error(&self, message: Option<String>) {
        if let Ok(mut current) = self.input_error.lock() {
            *current = message;
        }
    }

    fn lock_live(&self) -> Result<std::sync::MutexGuard<'_, LiveSession>, DashboardError> {
        self.live
            .lock()
            .map_err(|_| DashboardError::Config("dashboard state poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::simulated::SimDevice;
    use crate::device::CONNECT_FAILED_MESSAGE;
    use crate::persistence::{MemoryStore, PersistenceError};
    use crate::session::{Credential, StaticSession};
    use crate::types::DeviceFrame;
    use async_trait::async_trait;
    use std::time::Duration;

    fn frame(heart_rate: f64, beat_avg: f64, spo2: f64) -> DeviceFrame {
        DeviceFrame {
            heart_rate,
            beat_avg,
            spo2,
            finger_detected: true,
            ir_value: 51000.0,
        }
    }

    fn signed_in() -> Arc<StaticSession> {
        Arc::new(StaticSession::signed_in(
            UserIdentity::new("user-42").with_name("Ada"),
            Credential::bearer("tok"),
        ))
    }

    struct Fixture {
        device: Arc<SimDevice>,
        store: Arc<MemoryStore>,
        session: Arc<StaticSession>,
        dashboard: Dashboard,
    }

    fn fixture_with(store: MemoryStore, session: Arc<StaticSession>) -> Fixture {
        let device = SimDevice::new();
        let store = Arc::new(store);
        let dashboard = Dashboard::new(
            DashboardConfig::default(),
            device.clone(),
            store.clone(),
            session.clone(),
        )
        .unwrap();
        Fixture {
            device,
            store,
            session,
            dashboard,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MemoryStore::new(), signed_in())
    }

    async fn wait_for(dashboard: &Dashboard, state: ConnectionState) {
        let mut rx = dashboard.watch_status();
        rx.wait_for(|s| s.state == state).await.unwrap();
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_two_frames_reach_window_and_store() {
        let fx = fixture();
        fx.dashboard.connect_to("192.168.1.100").unwrap();
        wait_for(&fx.dashboard, ConnectionState::Open).await;

        fx.device.send_frame(&frame(72.0, 70.0, 98.0));
        fx.device.send_frame(&frame(75.0, 71.0, 97.0));
        settle().await;
        fx.dashboard.settle_writes().await;

        let recent = fx.dashboard.recent(2);
        let rates: Vec<f64> = recent.iter().map(|r| r.heart_rate()).collect();
        assert_eq!(rates, vec![72.0, 75.0]);
        assert_eq!(recent[1].avg_heart_rate(), 71.0);
        assert_eq!(recent[1].spo2(), 97.0);

        let stored = fx.store.readings();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.user_id().as_str() == "user-42"));
        let mut stored_rates: Vec<f64> = stored.iter().map(|r| r.heart_rate()).collect();
        stored_rates.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(stored_rates, vec![72.0, 75.0]);
        assert_eq!(fx.store.tokens(), vec!["tok".to_string(), "tok".to_string()]);

        let vitals = fx.dashboard.live_vitals().unwrap();
        assert_eq!(vitals.heart_rate, 75.0);
        assert_eq!(vitals.ir_value, 51000.0);
    }

    #[tokio::test]
    async fn test_failing_store_does_not_touch_live_path() {
        let fx = fixture_with(MemoryStore::failing(), signed_in());
        fx.dashboard.connect_to("10.0.0.9").unwrap();
        wait_for(&fx.dashboard, ConnectionState::Open).await;

        for hr in 60..70 {
            fx.device.send_frame(&frame(hr as f64, 65.0, 98.0));
        }
        settle().await;
        fx.dashboard.settle_writes().await;

        assert_eq!(fx.dashboard.history().len(), 10);
        assert_eq!(fx.dashboard.state(), ConnectionState::Open);
        assert!(fx.store.is_empty());
        assert_eq!(fx.dashboard.error_message(), None);
    }

    #[tokio::test]
    async fn test_window_is_bounded_by_config() {
        let fx = fixture();
        fx.dashboard.connect_to("10.0.0.9").unwrap();
        wait_for(&fx.dashboard, ConnectionState::Open).await;

        for i in 0..65 {
            fx.device.send_frame(&frame(60.0 + i as f64, 65.0, 98.0));
            if i % 8 == 0 {
                settle().await;
            }
        }
        settle().await;

        let history = fx.dashboard.history();
        assert_eq!(history.len(), 60);
        assert_eq!(history[0].heart_rate(), 65.0);
        assert_eq!(history[59].heart_rate(), 124.0);

        let rows = fx.dashboard.recent_rows();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].heart_rate, "115");
        assert_eq!(rows[9].heart_rate, "124");
        fx.dashboard.settle_writes().await;
        assert_eq!(fx.store.len(), 65);
    }

    #[tokio::test]
    async fn test_empty_address_rejected() {
        let fx = fixture();

        // Nothing entered
        assert!(matches!(fx.dashboard.connect(), Err(DashboardError::InvalidAddress(_))));
        assert_eq!(fx.dashboard.error_message().as_deref(), Some(ENTER_ADDRESS_MESSAGE));

        fx.dashboard.set_address(Some("  ".into()));
        assert!(matches!(fx.dashboard.connect(), Err(DashboardError::InvalidAddress(_))));
        assert!(matches!(fx.dashboard.connect_to(""), Err(DashboardError::InvalidAddress(_))));

        assert_eq!(fx.dashboard.state(), ConnectionState::Idle);
        assert_eq!(fx.device.open_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_address_gets_its_own_message() {
        let fx = fixture();

        for input in ["http://10.0.0.5", "10.0.0.5:abc"] {
            assert!(matches!(
                fx.dashboard.connect_to(input),
                Err(DashboardError::InvalidAddress(_))
            ));
            let message = fx.dashboard.error_message().unwrap();
            assert!(message.starts_with(BAD_ADDRESS_MESSAGE), "{}", message);
            assert_ne!(message, ENTER_ADDRESS_MESSAGE);
        }
        assert_eq!(fx.dashboard.state(), ConnectionState::Idle);
        assert_eq!(fx.device.open_count(), 0);

        assert!(fx.dashboard.connect_to(" ").is_err());
        assert_eq!(fx.dashboard.error_message().as_deref(), Some(ENTER_ADDRESS_MESSAGE));
    }

    #[tokio::test]
    async fn test_stored_address_used_and_error_cleared() {
        let fx = fixture();
        assert!(fx.dashboard.connect().is_err());

        fx.dashboard.set_address(Some("192.168.4.1".into()));
        fx.dashboard.connect().unwrap();
        wait_for(&fx.dashboard, ConnectionState::Open).await;

        assert_eq!(fx.dashboard.error_message(), None);
        assert!(fx.dashboard.is_connected());
        assert_eq!(fx.device.opened_addresses(), vec!["ws://192.168.4.1:81/".to_string()]);
    }

    #[tokio::test]
    async fn test_signed_out_cannot_connect() {
        let fx = fixture_with(MemoryStore::new(), Arc::new(StaticSession::signed_out()));
        assert!(matches!(
            fx.dashboard.connect_to("10.0.0.9"),
            Err(DashboardError::SignedOut)
        ));
        assert_eq!(fx.dashboard.state(), ConnectionState::Idle);
        assert_eq!(fx.device.open_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_device_surfaces_diagnostic() {
        let fx = fixture();
        fx.device.set_reachable(false);
        fx.dashboard.connect_to("10.0.0.9").unwrap();
        wait_for(&fx.dashboard, ConnectionState::Errored).await;

        assert_eq!(fx.dashboard.error_message().as_deref(), Some(CONNECT_FAILED_MESSAGE));
        assert!(!fx.dashboard.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_discards_window() {
        let fx = fixture();
        fx.dashboard.connect_to("10.0.0.9").unwrap();
        wait_for(&fx.dashboard, ConnectionState::Open).await;
        fx.device.send_frame(&frame(72.0, 70.0, 98.0));
        settle().await;
        assert_eq!(fx.dashboard.history().len(), 1);

        fx.dashboard.disconnect();
        fx.dashboard.disconnect();
        assert_eq!(fx.dashboard.state(), ConnectionState::Closed);
        assert!(fx.dashboard.history().is_empty());
        assert!(fx.dashboard.live_vitals().is_none());

        // Frames after teardown go nowhere
        fx.device.send_frame(&frame(80.0, 70.0, 98.0));
        settle().await;
        assert!(fx.dashboard.history().is_empty());

        // Reconnect starts a fresh window
        fx.dashboard.connect_to("10.0.0.9").unwrap();
        wait_for(&fx.dashboard, ConnectionState::Open).await;
        fx.device.send_frame(&frame(81.0, 70.0, 98.0));
        settle().await;
        let rates: Vec<f64> = fx.dashboard.history().iter().map(|r| r.heart_rate()).collect();
        assert_eq!(rates, vec![81.0]);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_single_subscription() {
        let fx = fixture();
        fx.dashboard.connect_to("10.0.0.9").unwrap();
        wait_for(&fx.dashboard, ConnectionState::Open).await;
        fx.dashboard.connect_to("10.0.0.10").unwrap();
        wait_for(&fx.dashboard, ConnectionState::Open).await;

        fx.device.send_frame(&frame(72.0, 70.0, 98.0));
        settle().await;
        fx.dashboard.settle_writes().await;

        assert_eq!(fx.dashboard.history().len(), 1);
        assert_eq!(fx.store.len(), 1);
    }

    #[tokio::test]
    async fn test_sign_out_tears_down_and_logs_out() {
        let fx = fixture();
        fx.dashboard.connect_to("10.0.0.9").unwrap();
        wait_for(&fx.dashboard, ConnectionState::Open).await;
        fx.device.send_frame(&frame(72.0, 70.0, 98.0));
        settle().await;

        fx.dashboard.sign_out();
        assert_eq!(fx.dashboard.state(), ConnectionState::Closed);
        assert!(fx.dashboard.history().is_empty());
        assert!(fx.session.current_user().is_none());
        assert!(matches!(
            fx.dashboard.connect_to("10.0.0.9"),
            Err(DashboardError::SignedOut)
        ));
    }

    #[tokio::test]
    async fn test_missing_credential_drops_write_only() {
        let fx = fixture();
        fx.dashboard.connect_to("10.0.0.9").unwrap();
        wait_for(&fx.dashboard, ConnectionState::Open).await;

        // Session ends underneath a live connection
        fx.session.logout();
        fx.device.send_frame(&frame(72.0, 70.0, 98.0));
        settle().await;
        fx.dashboard.settle_writes().await;

        assert_eq!(fx.dashboard.history().len(), 1);
        assert!(fx.store.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DashboardConfig {
            history_capacity: 0,
            ..Default::default()
        };
        let result = Dashboard::new(
            config,
            SimDevice::new(),
            Arc::new(MemoryStore::new()),
            signed_in(),
        );
        assert!(matches!(result, Err(DashboardError::Config(_))));
    }

    /// Holds every write until the test opens the gate.
    struct GatedStore {
        gate: Arc<tokio::sync::Semaphore>,
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl ReadingStore for GatedStore {
        async fn write(&self, reading: &Reading, credential: &Credential) -> Result<(), PersistenceError> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| PersistenceError::Network(e.to_string()))?;
            self.inner.write(reading, credential).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_leaves_write_in_flight() {
        let device = SimDevice::new();
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let stored = Arc::new(MemoryStore::new());
        let store = Arc::new(GatedStore {
            gate: gate.clone(),
            inner: stored.clone(),
        });
        let dashboard = Dashboard::new(DashboardConfig::default(), device.clone(), store, signed_in()).unwrap();

        dashboard.connect_to("10.0.0.9").unwrap();
        wait_for(&dashboard, ConnectionState::Open).await;
        device.send_frame(&frame(72.0, 70.0, 98.0));
        settle().await;
        assert_eq!(dashboard.history().len(), 1);
        assert!(stored.is_empty());

        dashboard.disconnect();
        assert!(dashboard.history().is_empty());

        gate.add_permits(1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let readings = stored.readings();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].heart_rate(), 72.0);
        assert_eq!(readings[0].user_id().as_str(), "user-42");
    }

    #[tokio::test]
    async fn test_stale_sink_cannot_write_after_reconnect() {
        let fx = fixture();
        fx.dashboard.connect_to("10.0.0.9").unwrap();
        wait_for(&fx.dashboard, ConnectionState::Open).await;

        // A sink the reader task could still hold from the first session
        let epoch = fx.dashboard.live.lock().unwrap().epoch;
        let stale = fx.dashboard.frame_sink(UserId::new("user-42"), epoch);

        fx.dashboard.disconnect();
        fx.dashboard.connect_to("10.0.0.9").unwrap();
        wait_for(&fx.dashboard, ConnectionState::Open).await;

        stale(&FrameEvent::received_now(frame(99.0, 90.0, 95.0)));
        assert!(fx.dashboard.history().is_empty());
        assert!(fx.dashboard.live_vitals().is_none());

        fx.device.send_frame(&frame(72.0, 70.0, 98.0));
        settle().await;
        fx.dashboard.settle_writes().await;

        let rates: Vec<f64> = fx.dashboard.history().iter().map(|r| r.heart_rate()).collect();
        assert_eq!(rates, vec![72.0]);
        assert_eq!(fx.store.len(), 1);
    }
}
