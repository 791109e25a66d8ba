//! WebSocket transport for the sensor firmware.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::transport::{DeviceConnector, DeviceLink, LinkMessage};
use super::{DeviceAddress, StreamError};

/// Connects to devices over `ws://` / `wss://`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl DeviceConnector for WsConnector {
    async fn open(&self, address: &DeviceAddress) -> Result<Box<dyn DeviceLink>, StreamError> {
        let (stream, _response) = tokio_tungstenite::connect_async(address.url())
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        Ok(Box::new(WsLink { stream }))
    }
}

struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl DeviceLink for WsLink {
    async fn recv(&mut self) -> Result<LinkMessage, StreamError> {
        loop {
            match self.stream.next().await {
                None => return Ok(LinkMessage::Closed),
                Some(Ok(Message::Text(text))) => return Ok(LinkMessage::Payload(text.into_bytes())),
                Some(Ok(Message::Binary(data))) => return Ok(LinkMessage::Payload(data)),
                Some(Ok(Message::Close(_))) => return Ok(LinkMessage::Closed),
                // Pings are answered by tungstenite itself
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    return Ok(LinkMessage::Closed)
                }
                Some(Err(e)) => return Err(StreamError::Transport(e.to_string())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(StreamError::Transport(e.to_string())),
        }
    }
}
