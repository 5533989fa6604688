//! WebSocket transport backed by tokio-tungstenite

use crate::error::{Result, StompSocketError};
use crate::message::WsMessage;
use crate::transport::{Transport, TransportStream};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Default limit on the TCP + TLS + upgrade round trip
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on waiting for the peer's close acknowledgement
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// `ws://` / `wss://` transport
#[derive(Debug, Clone)]
pub struct TungsteniteTransport {
    connect_timeout: Duration,
}

impl TungsteniteTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TungsteniteTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn TransportStream>> {
        let request = url
            .into_client_request()
            .map_err(|e| StompSocketError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        match request.uri().scheme_str() {
            Some("ws") | Some("wss") => {}
            other => {
                return Err(StompSocketError::InvalidUrl {
                    url: url.to_string(),
                    reason: format!("unsupported scheme {:?}", other),
                })
            }
        }

        let (ws_stream, response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                StompSocketError::Timeout(format!(
                    "connecting to {} took longer than {:?}",
                    url, self.connect_timeout
                ))
            })?
            .map_err(|e| StompSocketError::WebSocket(e.to_string()))?;

        debug!("WebSocket upgrade to {} completed ({})", url, response.status());
        Ok(Box::new(TungsteniteStream {
            inner: ws_stream,
            closed: false,
        }))
    }
}

struct TungsteniteStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl TransportStream for TungsteniteStream {
    async fn send(&mut self, message: WsMessage) -> Result<()> {
        if self.closed {
            return Err(StompSocketError::NotConnected);
        }
        self.inner
            .send(ws_message_to_tungstenite(message))
            .await
            .map_err(|e| StompSocketError::WebSocket(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<WsMessage>> {
        if self.closed {
            return None;
        }
        loop {
            match self.inner.next().await? {
                Ok(Message::Close(frame)) => {
                    debug!("Peer closed the connection: {:?}", frame);
                    return None;
                }
                Ok(message) => {
                    // Control frames are answered by tungstenite itself
                    if let Some(message) = tungstenite_to_ws_message(message) {
                        return Some(Ok(message));
                    }
                }
                Err(e) => return Some(Err(StompSocketError::WebSocket(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if tokio::time::timeout(CLOSE_TIMEOUT, self.inner.close(None))
            .await
            .is_err()
        {
            debug!("Close handshake timed out");
        }
    }
}

fn ws_message_to_tungstenite(message: WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
    }
}

fn tungstenite_to_ws_message(message: Message) -> Option<WsMessage> {
    match message {
        Message::Text(text) => Some(WsMessage::Text(text)),
        Message::Binary(data) => Some(WsMessage::Binary(data)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}
