//! WebSocket device emulator
//!
//! Serves a frame script to every client that connects at `/`, one frame per
//! tick, the way the sensor firmware pushes readings. Used by the integration
//! tests and the `device_emulator` binary when no hardware is around.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use warp::ws::{Message, WebSocket};
use warp::Filter;

use super::StreamError;
use crate::types::DeviceFrame;

/// Cadence of the reference firmware.
pub const DEFAULT_CADENCE: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct DeviceEmulator {
    script: Arc<Vec<String>>,
    cadence: Duration,
    repeat: bool,
    close_when_done: bool,
}

impl DeviceEmulator {
    /// Serve raw text messages as-is, malformed ones included.
    pub fn scripted(messages: Vec<String>) -> Self {
        Self {
            script: Arc::new(messages),
            cadence: DEFAULT_CADENCE,
            repeat: false,
            close_when_done: false,
        }
    }

    pub fn from_frames(frames: &[DeviceFrame]) -> Result<Self, StreamError> {
        let messages = frames
            .iter()
            .map(|f| serde_json::to_string(f).map_err(|e| StreamError::Parse(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::scripted(messages))
    }

    /// Plausible resting vitals with a slow drift.
    pub fn generated(count: usize) -> Result<Self, StreamError> {
        let mut recent: Vec<f64> = Vec::with_capacity(4);
        let frames: Vec<DeviceFrame> = (0..count)
            .map(|i| {
                let t = i as f64;
                let heart_rate = (72.0 + (t * 0.3).sin() * 4.0 + (t * 0.7).cos() * 1.5).round();
                if recent.len() == 4 {
                    recent.remove(0);
                }
                recent.push(heart_rate);
                let beat_avg = (recent.iter().sum::<f64>() / recent.len() as f64).round();
                DeviceFrame {
                    heart_rate,
                    beat_avg,
                    spo2: (97.0 + (t * 0.2).sin()).round(),
                    finger_detected: true,
                    ir_value: 50_000.0 + ((i * 37) % 900) as f64,
                }
            })
            .collect();
        Self::from_frames(&frames)
    }

    pub fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    /// Start over from the first message once the script runs out.
    pub fn repeating(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    /// Send a close frame after the last message instead of idling.
    pub fn closing_when_done(mut self, close: bool) -> Self {
        self.close_when_done = close;
        self
    }

    /// Start serving on `addr` (port 0 picks a free port). Must be called
    /// from within a tokio runtime.
    pub fn serve(self, addr: impl Into<SocketAddr>) -> Result<EmulatorHandle, StreamError> {
        let emulator = self;
        let route = warp::path::end().and(warp::ws()).map(move |ws: warp::ws::Ws| {
            let session = emulator.clone();
            ws.on_upgrade(move |socket| session.stream_to(socket))
        });

        let addr: SocketAddr = addr.into();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (local_addr, server) = warp::serve(route)
            .try_bind_with_graceful_shutdown(addr, async {
                let _ = shutdown_rx.await;
            })
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        tokio::spawn(server);
        log::info!("Device emulator listening on ws://{}/", local_addr);
        Ok(EmulatorHandle {
            addr: local_addr,
            shutdown: Some(shutdown_tx),
        })
    }

    async fn stream_to(self, socket: WebSocket) {
        let (mut tx, mut rx) = socket.split();
        let mut ticker = tokio::time::interval(self.cadence);
        let mut index = 0usize;

        log::debug!("Emulator client connected");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if index >= self.script.len() {
                        if self.repeat && !self.script.is_empty() {
                            index = 0;
                        } else {
                            break;
                        }
                    }
                    if tx.send(Message::text(self.script[index].clone())).await.is_err() {
                        return;
                    }
                    index += 1;
                }
                incoming = rx.next() => match incoming {
                    Some(Ok(msg)) if msg.is_close() => return,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => return,
                }
            }
        }

        if self.close_when_done {
            let _ = tx.send(Message::close()).await;
            let _ = tx.close().await;
            return;
        }
        // Idle until the client leaves
        while let Some(Ok(msg)) = rx.next().await {
            if msg.is_close() {
                break;
            }
        }
    }
}

/// A running emulator. Dropping the handle stops accepting new clients.
pub struct EmulatorHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl EmulatorHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `host:port` form accepted by `DeviceAddress::parse`.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for EmulatorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_frames_are_plausible() {
        let emulator = DeviceEmulator::generated(40).unwrap();
        assert_eq!(emulator.script.len(), 40);
        for message in emulator.script.iter() {
            let frame = DeviceFrame::parse(message.as_bytes()).unwrap();
            assert!((60.0..=85.0).contains(&frame.heart_rate));
            assert!((95.0..=99.0).contains(&frame.spo2));
            assert!(frame.finger_detected);
        }
    }

    #[tokio::test]
    async fn test_serve_binds_ephemeral_port() {
        let handle = DeviceEmulator::scripted(vec![])
            .serve(([127, 0, 0, 1], 0))
            .unwrap();
        assert_ne!(handle.local_addr().port(), 0);
        handle.shutdown();
    }
}
