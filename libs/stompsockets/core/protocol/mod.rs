//! Protocol adapter
//!
//! Turns an open transport into a topic-addressed message channel.
//!
//! # Modes
//!
//! ```text
//! open ──CONNECT──> peer
//!        <──CONNECTED──  within handshake timeout  → Framed (STOMP)
//!        <──{"type":..}── / ERROR / timeout       → Raw (JSON envelopes)
//! ```
//!
//! In framed mode each topic is subscribed to its destination and inbound
//! MESSAGE frames are resolved back to the topic. In raw mode the peer pushes
//! every message to the one connection and the envelope's `type` names the
//! topic, so subscribing is a no-op.

pub mod frame;
pub mod raw;

use crate::error::{Result, StompSocketError};
use crate::events::{InboundMessage, Topic};
use crate::message::WsMessage;
use frame::{decode_each, decode_frames, looks_like_frame, Command, Frame};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// STOMP versions offered in the CONNECT frame
pub const ACCEPT_VERSIONS: &str = "1.2,1.1,1.0";

/// Default destination for live server status
pub const SERVER_STATUS_DESTINATION: &str = "/status-of-servers/server-status-updates";

/// Default destination for scheduler notifications
pub const SCHEDULER_STATUS_DESTINATION: &str = "/status-of-servers/scheduler-updates";

/// Protocol selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    /// Attempt the STOMP handshake, fall back to raw on failure
    #[default]
    Stomp,
    /// Treat the socket as a raw JSON channel from the start
    Raw,
}

/// Protocol negotiated for the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMode {
    Framed,
    Raw,
}

/// Bidirectional topic ↔ destination mapping
///
/// Unmapped topics use their own name as the destination.
#[derive(Debug, Clone)]
pub struct DestinationMap {
    by_topic: HashMap<Topic, String>,
    by_destination: HashMap<String, Topic>,
}

impl DestinationMap {
    /// An empty map (every topic is its own destination)
    pub fn empty() -> Self {
        Self {
            by_topic: HashMap::new(),
            by_destination: HashMap::new(),
        }
    }

    /// Map `topic` to `destination`, replacing any earlier mapping for either side
    pub fn insert(&mut self, topic: Topic, destination: impl Into<String>) {
        let destination = destination.into();
        if let Some(old_destination) = self.by_topic.remove(&topic) {
            self.by_destination.remove(&old_destination);
        }
        if let Some(old_topic) = self.by_destination.remove(&destination) {
            self.by_topic.remove(&old_topic);
        }
        self.by_destination.insert(destination.clone(), topic.clone());
        self.by_topic.insert(topic, destination);
    }

    pub fn destination_for(&self, topic: &Topic) -> String {
        self.by_topic
            .get(topic)
            .cloned()
            .unwrap_or_else(|| topic.as_str().to_string())
    }

    pub fn topic_for(&self, destination: &str) -> Option<Topic> {
        match self.by_destination.get(destination) {
            Some(topic) => Some(topic.clone()),
            None => Topic::new(destination).ok(),
        }
    }
}

impl Default for DestinationMap {
    fn default() -> Self {
        let mut map = Self::empty();
        map.insert(Topic(Topic::SERVER_STATUS.to_string()), SERVER_STATUS_DESTINATION);
        map.insert(
            Topic(Topic::SCHEDULER_STATUS.to_string()),
            SCHEDULER_STATUS_DESTINATION,
        );
        map
    }
}

/// Static protocol settings shared by every connection
#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    pub mode: ProtocolMode,
    /// Value of the CONNECT `host` header
    pub host: String,
    /// Client heart-beat interval advertised in CONNECT (`None` = no heart-beats)
    pub heartbeat: Option<Duration>,
    /// Extra CONNECT headers (e.g. `Authorization`)
    pub connect_headers: Vec<(String, String)>,
    pub destinations: Arc<DestinationMap>,
}

/// Result of feeding one inbound message to a pending handshake
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// CONNECTED received; framed mode is active
    Connected { version: Option<String> },
    /// Heart-beat or nothing conclusive yet
    Pending,
    /// Peer does not speak STOMP; raw mode is active and `carried` holds
    /// whatever the first payload decoded to
    FellBack {
        reason: String,
        carried: Vec<Result<InboundMessage>>,
    },
}

/// Per-connection protocol state
pub struct ProtocolAdapter {
    settings: ProtocolSettings,
    mode: WireMode,
    /// Topic -> subscription id for SUBSCRIBE frames sent on this connection
    active: HashMap<Topic, String>,
    /// Subscription id -> topic, for resolving MESSAGE frames
    by_id: HashMap<String, Topic>,
    next_subscription: u64,
}

impl ProtocolAdapter {
    pub fn new(settings: ProtocolSettings) -> Self {
        let mode = initial_mode(settings.mode);
        Self {
            settings,
            mode,
            active: HashMap::new(),
            by_id: HashMap::new(),
            next_subscription: 0,
        }
    }

    /// Reset per-connection state before a new handshake
    pub fn begin_session(&mut self) {
        self.mode = initial_mode(self.settings.mode);
        self.active.clear();
        self.by_id.clear();
    }

    #[inline]
    pub fn mode(&self) -> WireMode {
        self.mode
    }

    /// Whether a handshake is required before the connection is usable
    pub fn needs_handshake(&self) -> bool {
        self.settings.mode == ProtocolMode::Stomp
    }

    /// CONNECT frame opening the STOMP session
    pub fn connect_frame(&self) -> WsMessage {
        let heartbeat_ms = self
            .settings
            .heartbeat
            .map(|interval| interval.as_millis())
            .unwrap_or(0);

        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSIONS)
            .header("host", self.settings.host.clone())
            .header("heart-beat", format!("{},0", heartbeat_ms));
        for (name, value) in &self.settings.connect_headers {
            frame = frame.header(name.clone(), value.clone());
        }

        WsMessage::Text(frame.encode())
    }

    /// Feed one inbound message received while the handshake is pending
    pub fn on_handshake_message(&mut self, message: &WsMessage) -> HandshakeOutcome {
        let Some(text) = message.to_text() else {
            self.mode = WireMode::Raw;
            return HandshakeOutcome::FellBack {
                reason: "first payload is not text".to_string(),
                carried: vec![Err(StompSocketError::ParseError(
                    "binary payload is not UTF-8".to_string(),
                ))],
            };
        };

        if !looks_like_frame(text) {
            self.mode = WireMode::Raw;
            return HandshakeOutcome::FellBack {
                reason: "first payload is not a STOMP frame".to_string(),
                carried: raw::parse_raw(text),
            };
        }

        let frames = match decode_frames(text) {
            Ok(frames) => frames,
            Err(e) => {
                self.mode = WireMode::Raw;
                return HandshakeOutcome::FellBack {
                    reason: format!("malformed STOMP preamble: {}", e),
                    carried: Vec::new(),
                };
            }
        };

        match frames.first() {
            None => HandshakeOutcome::Pending,
            Some(frame) if frame.command == Command::Connected => {
                self.mode = WireMode::Framed;
                HandshakeOutcome::Connected {
                    version: frame.get_header("version").map(str::to_string),
                }
            }
            Some(frame) if frame.command == Command::Error => {
                self.mode = WireMode::Raw;
                let detail = frame
                    .get_header("message")
                    .map(str::to_string)
                    .unwrap_or_else(|| frame.body.clone());
                HandshakeOutcome::FellBack {
                    reason: format!("peer rejected CONNECT: {}", detail),
                    carried: Vec::new(),
                }
            }
            Some(frame) => {
                self.mode = WireMode::Raw;
                HandshakeOutcome::FellBack {
                    reason: format!("unexpected {} frame during handshake", frame.command),
                    carried: Vec::new(),
                }
            }
        }
    }

    /// Switch to raw mode (handshake timed out)
    pub fn fall_back_to_raw(&mut self) {
        self.mode = WireMode::Raw;
    }

    /// Whether `topic` has a live SUBSCRIBE on this connection
    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.active.contains_key(topic)
    }

    /// SUBSCRIBE frame for `topic`
    ///
    /// `None` in raw mode, for the local `error` topic, or when the topic is
    /// already subscribed on this connection.
    pub fn subscribe(&mut self, topic: &Topic) -> Option<WsMessage> {
        if self.mode != WireMode::Framed || topic.is_error() || self.active.contains_key(topic) {
            return None;
        }

        let id = format!("sub-{}", self.next_subscription);
        self.next_subscription += 1;
        let destination = self.settings.destinations.destination_for(topic);

        self.active.insert(topic.clone(), id.clone());
        self.by_id.insert(id.clone(), topic.clone());

        let frame = Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto");
        Some(WsMessage::Text(frame.encode()))
    }

    /// UNSUBSCRIBE frame for `topic`, if it is subscribed on this connection
    pub fn unsubscribe(&mut self, topic: &Topic) -> Option<WsMessage> {
        if self.mode != WireMode::Framed {
            return None;
        }
        let id = self.active.remove(topic)?;
        self.by_id.remove(&id);
        Some(WsMessage::Text(Frame::new(Command::Unsubscribe).header("id", id).encode()))
    }

    /// Outbound application message
    pub fn send_message(&self, destination: &str, payload: &serde_json::Value) -> Result<WsMessage> {
        let body = serde_json::to_string(payload)?;
        let message = match self.mode {
            WireMode::Framed => Frame::new(Command::Send)
                .header("destination", destination)
                .header("content-type", "application/json")
                .body(body)
                .encode(),
            WireMode::Raw => body,
        };
        Ok(WsMessage::Text(message))
    }

    /// DISCONNECT frame for a graceful close (framed mode only)
    pub fn disconnect_frame(&self) -> Option<WsMessage> {
        match self.mode {
            WireMode::Framed => Some(WsMessage::Text(Frame::new(Command::Disconnect).encode())),
            WireMode::Raw => None,
        }
    }

    /// Client heart-beat (a bare EOL), framed mode only
    pub fn heartbeat_frame(&self) -> Option<WsMessage> {
        match self.mode {
            WireMode::Framed => Some(WsMessage::Text("\n".to_string())),
            WireMode::Raw => None,
        }
    }

    /// Parse one inbound transport message
    ///
    /// Every element is one decoded message or one discarded frame.
    pub fn parse(&self, message: &WsMessage) -> Vec<Result<InboundMessage>> {
        let Some(text) = message.to_text() else {
            return vec![Err(StompSocketError::ParseError(
                "binary payload is not UTF-8".to_string(),
            ))];
        };

        match self.mode {
            WireMode::Raw => raw::parse_raw(text),
            WireMode::Framed => decode_each(text)
                .into_iter()
                .filter_map(|frame| match frame {
                    Ok(frame) => self.frame_to_message(frame),
                    Err(e) => Some(Err(e)),
                })
                .collect(),
        }
    }

    fn frame_to_message(&self, frame: Frame) -> Option<Result<InboundMessage>> {
        match frame.command {
            Command::Message => Some(self.decode_message_frame(&frame)),
            Command::Error => {
                warn!(
                    "STOMP ERROR frame: {}",
                    frame.get_header("message").unwrap_or(frame.body.as_str())
                );
                None
            }
            Command::Receipt => {
                debug!("STOMP receipt {:?}", frame.get_header("receipt-id"));
                None
            }
            other => {
                debug!("Ignoring unexpected {} frame", other);
                None
            }
        }
    }

    fn decode_message_frame(&self, frame: &Frame) -> Result<InboundMessage> {
        let topic = frame
            .get_header("subscription")
            .and_then(|id| self.by_id.get(id).cloned())
            .or_else(|| {
                frame
                    .get_header("destination")
                    .and_then(|destination| self.settings.destinations.topic_for(destination))
            })
            .ok_or_else(|| {
                StompSocketError::Frame("MESSAGE without a resolvable destination".to_string())
            })?;

        let data: serde_json::Value = serde_json::from_str(&frame.body)?;
        InboundMessage::decode(topic, data)
    }
}

fn initial_mode(mode: ProtocolMode) -> WireMode {
    match mode {
        ProtocolMode::Stomp => WireMode::Framed,
        ProtocolMode::Raw => WireMode::Raw,
    }
}
