//! Sensor device link
//!
//! The stream client owns a single live connection to the sensor device, turns
//! each inbound message into a `FrameEvent` and hands it to its subscribers.
//! Transports sit behind the `DeviceConnector` / `DeviceLink` traits so the
//! WebSocket transport and the in-process simulator are interchangeable.

pub mod client;
pub mod emulator;
pub mod simulated;
pub mod transport;
pub mod websocket;

pub use client::{ConnectionState, LinkStatus, StreamClient};
pub use transport::{DeviceConnector, DeviceLink, LinkMessage};
pub use websocket::WsConnector;

use std::fmt;

use thiserror::Error;

/// Port the device firmware serves its WebSocket on.
pub const DEFAULT_DEVICE_PORT: u16 = 81;

/// Diagnostic shown to the user when the device cannot be reached.
pub const CONNECT_FAILED_MESSAGE: &str =
    "Failed to connect. Check the IP address and ensure the ESP32 is online.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// A validated device endpoint, always a `ws://` or `wss://` URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceAddress {
    url: String,
}

impl DeviceAddress {
    /// Normalize user input into a device URL.
    ///
    /// Accepts a bare host (`192.168.1.100`), `host:port`, or a full
    /// `ws://` / `wss://` URL. Bare hosts get `default_port`.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, StreamError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(StreamError::InvalidAddress("address is empty".into()));
        }
        if input.chars().any(char::is_whitespace) {
            return Err(StreamError::InvalidAddress(format!(
                "'{}' contains whitespace",
                input
            )));
        }

        if let Some((scheme, rest)) = input.split_once("://") {
            if !matches!(scheme.to_ascii_lowercase().as_str(), "ws" | "wss") {
                return Err(StreamError::InvalidAddress(format!(
                    "unsupported scheme '{}'",
                    scheme
                )));
            }
            let host = rest.split('/').next().unwrap_or_default();
            if host.is_empty() {
                return Err(StreamError::InvalidAddress(format!("'{}' has no host", input)));
            }
            return Ok(Self {
                url: input.to_string(),
            });
        }

        let (host, port) = split_host_port(input, default_port)?;
        if host.is_empty() {
            return Err(StreamError::InvalidAddress(format!("'{}' has no host", input)));
        }
        Ok(Self {
            url: format!("ws://{}:{}/", host, port),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Split `host[:port]`, bracketing bare IPv6 literals.
fn split_host_port(input: &str, default_port: u16) -> Result<(String, u16), StreamError> {
    if let Some(rest) = input.strip_prefix('[') {
        // [v6]:port or [v6]
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| StreamError::InvalidAddress(format!("unclosed '[' in '{}'", input)))?;
        let port = match tail.strip_prefix(':') {
            Some(p) => parse_port(p, input)?,
            None if tail.is_empty() => default_port,
            None => return Err(StreamError::InvalidAddress(format!("unexpected '{}'", tail))),
        };
        return Ok((format!("[{}]", host), port));
    }

    match input.matches(':').count() {
        0 => Ok((input.to_string(), default_port)),
        1 => {
            let (host, port) = input.split_once(':').unwrap_or((input, ""));
            Ok((host.to_string(), parse_port(port, input)?))
        }
        // Bare IPv6 literal
        _ => Ok((format!("[{}]", input), default_port)),
    }
}

fn parse_port(port: &str, input: &str) -> Result<u16, StreamError> {
    match port.parse::<u16>() {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(StreamError::InvalidAddress(format!(
            "invalid port '{}' in '{}'",
            port, input
        ))),
    }
}
