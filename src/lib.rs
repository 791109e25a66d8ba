// Pulselink - live heart-rate / SpO2 monitoring

pub mod dashboard;
pub mod device;
pub mod history;
pub mod persistence;
pub mod session;
pub mod types;

pub use dashboard::{Dashboard, DashboardConfig, DashboardError};
pub use device::{ConnectionState, StreamClient, StreamError, WsConnector};
pub use history::HistoryWindow;
pub use persistence::{HttpReadingStore, PersistenceForwarder, ReadingStore};
pub use session::{Credential, SessionGate, StaticSession, UserIdentity};
pub use types::{DeviceFrame, FrameEvent, LiveVitals, Reading, UserId};
