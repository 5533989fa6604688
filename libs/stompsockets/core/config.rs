use crate::protocol::{ProtocolMode, ProtocolSettings};
use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on waiting for CONNECTED after CONNECT was sent
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for EventClient
///
/// Built with the type-state builder; see [`crate::builder`].
pub struct ClientConfig {
    /// WebSocket URL (ws:// or wss://)
    pub(crate) url: String,

    /// Opens physical connections
    pub(crate) transport: Arc<dyn Transport>,

    /// Protocol mode, CONNECT headers, heart-beat and destination mapping
    pub(crate) protocol: ProtocolSettings,

    /// How long to wait for CONNECTED before falling back to raw mode
    pub(crate) handshake_timeout: Duration,

    /// Reconnection strategy
    pub(crate) reconnect_strategy: Box<dyn ReconnectionStrategy>,
}

impl ClientConfig {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn protocol_mode(&self) -> ProtocolMode {
        self.protocol.mode
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Check if a client heart-beat is configured
    pub fn has_heartbeat(&self) -> bool {
        self.protocol.heartbeat.is_some()
    }

    pub fn max_attempts(&self) -> Option<usize> {
        self.reconnect_strategy.max_attempts()
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("protocol", &self.protocol)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("max_attempts", &self.reconnect_strategy.max_attempts())
            .finish()
    }
}
