pub mod states;

use crate::client::EventClient;
use crate::config::{ClientConfig, DEFAULT_HANDSHAKE_TIMEOUT};
use crate::events::Topic;
use crate::protocol::{DestinationMap, ProtocolMode, ProtocolSettings};
use crate::traits::*;
use crate::websocket::{TungsteniteTransport, DEFAULT_CONNECT_TIMEOUT};
use states::*;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::http::Uri;

/// Type-state builder for EventClient
///
/// The URL is the only required field; `build()` is available once it is set.
///
/// ```ignore
/// let client = stompsockets::builder()
///     .url("ws://localhost:8082/serv-stat")
///     .handshake_timeout(Duration::from_secs(3))
///     .reconnect_strategy(FixedDelay::new(Duration::from_secs(5), Some(5)))
///     .build()
///     .await?;
/// ```
pub struct EventClientBuilder<U>
where
    U: UrlState,
{
    _state: PhantomData<U>,
    url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    protocol: ProtocolMode,
    host: Option<String>,
    handshake_timeout: Duration,
    connect_timeout: Duration,
    heartbeat: Option<Duration>,
    connect_headers: Vec<(String, String)>,
    destinations: DestinationMap,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
}

impl EventClientBuilder<NoUrl> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: PhantomData,
            url: None,
            transport: None,
            protocol: ProtocolMode::Stomp,
            host: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat: None,
            connect_headers: Vec::new(),
            destinations: DestinationMap::default(),
            reconnect_strategy: None,
        }
    }

    pub fn url(self, url: impl Into<String>) -> EventClientBuilder<HasUrl> {
        EventClientBuilder {
            _state: PhantomData,
            url: Some(url.into()),
            transport: self.transport,
            protocol: self.protocol,
            host: self.host,
            handshake_timeout: self.handshake_timeout,
            connect_timeout: self.connect_timeout,
            heartbeat: self.heartbeat,
            connect_headers: self.connect_headers,
            destinations: self.destinations,
            reconnect_strategy: self.reconnect_strategy,
        }
    }
}

impl Default for EventClientBuilder<NoUrl> {
    fn default() -> Self {
        Self::new()
    }
}

// Optional configuration methods
impl<U> EventClientBuilder<U>
where
    U: UrlState,
{
    /// Use a custom transport instead of the tokio-tungstenite one
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn protocol(mut self, mode: ProtocolMode) -> Self {
        self.protocol = mode;
        self
    }

    /// Value of the CONNECT `host` header (defaults to the URL's host)
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Bound on the WebSocket connect (ignored with a custom transport)
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Send a STOMP heart-beat every `interval` while connected in framed mode
    pub fn heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = Some(interval);
        self
    }

    /// Extra header for the CONNECT frame (e.g. `Authorization`)
    pub fn connect_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.connect_headers.push((name.into(), value.into()));
        self
    }

    /// Override the destination a topic is subscribed to
    pub fn topic_destination(mut self, topic: Topic, destination: impl Into<String>) -> Self {
        self.destinations.insert(topic, destination);
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }
}

// Build method - only available once the URL is set
impl EventClientBuilder<HasUrl> {
    /// Build the client and start connecting in the background
    ///
    /// Must be called within a tokio runtime.
    pub async fn build(self) -> Result<EventClient> {
        let url = self
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| StompSocketError::Configuration("URL must not be empty".to_string()))?;

        if self.handshake_timeout.is_zero() {
            return Err(StompSocketError::Configuration(
                "handshake timeout must be greater than zero".to_string(),
            ));
        }
        if matches!(self.heartbeat, Some(interval) if interval.is_zero()) {
            return Err(StompSocketError::Configuration(
                "heart-beat interval must be greater than zero".to_string(),
            ));
        }

        let host = self.host.unwrap_or_else(|| host_of(&url));
        let connect_timeout = self.connect_timeout;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(TungsteniteTransport::new(connect_timeout)));
        let reconnect_strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(FixedDelay::default()));

        let config = ClientConfig {
            url,
            transport,
            protocol: ProtocolSettings {
                mode: self.protocol,
                host,
                heartbeat: self.heartbeat,
                connect_headers: self.connect_headers,
                destinations: Arc::new(self.destinations),
            },
            handshake_timeout: self.handshake_timeout,
            reconnect_strategy,
        };

        EventClient::new(config).await
    }
}

fn host_of(url: &str) -> String {
    url.parse::<Uri>()
        .ok()
        .and_then(|uri| uri.host().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_defaults_to_url_host() {
        assert_eq!(host_of("ws://status.example.com:8082/serv-stat"), "status.example.com");
        assert_eq!(host_of("not a url"), "localhost");
    }

    #[tokio::test]
    async fn empty_url_is_rejected() {
        let result = EventClientBuilder::new().url("  ").build().await;
        assert!(matches!(result, Err(StompSocketError::Configuration(_))));
    }

    #[tokio::test]
    async fn zero_handshake_timeout_is_rejected() {
        let result = EventClientBuilder::new()
            .url("ws://localhost:1/x")
            .handshake_timeout(Duration::ZERO)
            .build()
            .await;
        assert!(matches!(result, Err(StompSocketError::Configuration(_))));
    }
}
