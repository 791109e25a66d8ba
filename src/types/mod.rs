//! Data types shared across the ingestion pipeline.

pub mod frame;
pub mod reading;

pub use frame::{DeviceFrame, FrameEvent, LiveVitals};
pub use reading::{Reading, UserId};
