//! Typed status events
//!
//! Every inbound payload is decoded into a [`StatusEvent`] keyed by its
//! topic, so listeners receive a known shape instead of an untyped blob.
//! Topics the client does not know about are still delivered, as
//! [`StatusEvent::Other`] carrying the raw JSON value.

use crate::error::{Result, StompSocketError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Logical event stream name
///
/// Topics are opaque; the only rule is that they are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(pub(crate) String);

impl Topic {
    /// Live server status changes
    pub const SERVER_STATUS: &'static str = "server-status-update";
    /// Scheduler start/stop notifications
    pub const SCHEDULER_STATUS: &'static str = "scheduler-status-update";
    /// Terminal connection failure (local only, never subscribed on the wire)
    pub const ERROR: &'static str = "error";

    /// Create a topic, rejecting empty names
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StompSocketError::InvalidTopic(
                "topic name must not be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the client-local `error` topic
    pub fn is_error(&self) -> bool {
        self.0 == Self::ERROR
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Topic {
    type Error = StompSocketError;

    fn try_from(value: &str) -> Result<Self> {
        Topic::new(value)
    }
}

impl TryFrom<String> for Topic {
    type Error = StompSocketError;

    fn try_from(value: String) -> Result<Self> {
        Topic::new(value)
    }
}

/// Health of a monitored server as reported by the scheduler service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerHealth {
    Online,
    Offline,
    ConnectError,
    #[serde(other)]
    Unknown,
}

/// One server status entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatusUpdate {
    pub server_id: String,
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub response_code: Option<String>,
    #[serde(default)]
    pub latency: Option<String>,
    pub server_status: ServerHealth,
}

/// The scheduler service publishes either a single entry or the whole batch
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<ServerStatusUpdate>),
    One(ServerStatusUpdate),
}

/// Which scheduler a status change refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerKind {
    MainScheduler,
    SingleScheduler,
    #[serde(other)]
    Other,
}

/// Scheduler status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    #[serde(rename = "type")]
    pub kind: SchedulerKind,
    pub status: SchedulerState,
}

/// Run state of a scheduler
///
/// The scheduler service pushes a boolean; a textual label is kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchedulerState {
    Flag(bool),
    Label(String),
}

impl SchedulerState {
    pub fn is_running(&self) -> bool {
        match self {
            SchedulerState::Flag(running) => *running,
            SchedulerState::Label(label) => matches!(
                label.to_ascii_lowercase().as_str(),
                "true" | "running" | "active"
            ),
        }
    }
}

/// Payload dispatched on the `error` topic when reconnection is exhausted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionLost {
    pub message: String,
    pub attempts: usize,
}

impl ConnectionLost {
    pub fn new(attempts: usize) -> Self {
        Self {
            message: "Connection lost".to_string(),
            attempts,
        }
    }
}

/// Typed payload, tagged by topic
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// `server-status-update`
    ServerStatus(Vec<ServerStatusUpdate>),
    /// `scheduler-status-update`
    SchedulerStatus(SchedulerStatus),
    /// `error`
    ConnectionLost(ConnectionLost),
    /// Any topic without a dedicated shape
    Other(serde_json::Value),
}

impl StatusEvent {
    /// Decode a JSON payload according to the topic it arrived on
    ///
    /// A payload that does not match its topic's schema is an error.
    pub fn decode(topic: &Topic, data: serde_json::Value) -> Result<Self> {
        let event = match topic.as_str() {
            Topic::SERVER_STATUS => match serde_json::from_value::<OneOrMany>(data)? {
                OneOrMany::Many(updates) => StatusEvent::ServerStatus(updates),
                OneOrMany::One(update) => StatusEvent::ServerStatus(vec![update]),
            },
            Topic::SCHEDULER_STATUS => StatusEvent::SchedulerStatus(serde_json::from_value(data)?),
            Topic::ERROR => StatusEvent::ConnectionLost(serde_json::from_value(data)?),
            _ => StatusEvent::Other(data),
        };
        Ok(event)
    }

    /// Server status entries, if this is a server status event
    pub fn server_statuses(&self) -> Option<&[ServerStatusUpdate]> {
        match self {
            StatusEvent::ServerStatus(updates) => Some(updates),
            _ => None,
        }
    }
}

/// A decoded message ready for dispatch
///
/// Produced by the protocol adapter and consumed immediately; never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: Topic,
    pub event: StatusEvent,
    pub received_at: DateTime<Utc>,
    /// Sender timestamp, when the wire format carries one
    pub sent_at: Option<DateTime<Utc>>,
}

impl InboundMessage {
    /// Decode `data` for `topic`, stamping the receive time
    pub fn decode(topic: Topic, data: serde_json::Value) -> Result<Self> {
        let event = StatusEvent::decode(&topic, data)?;
        Ok(Self {
            topic,
            event,
            received_at: Utc::now(),
            sent_at: None,
        })
    }

    /// The terminal connection-lost notification
    pub fn connection_lost(attempts: usize) -> Self {
        Self {
            topic: Topic(Topic::ERROR.to_string()),
            event: StatusEvent::ConnectionLost(ConnectionLost::new(attempts)),
            received_at: Utc::now(),
            sent_at: None,
        }
    }

    pub fn with_sent_at(mut self, sent_at: Option<DateTime<Utc>>) -> Self {
        self.sent_at = sent_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_topic_is_rejected() {
        assert!(Topic::new("").is_err());
        assert!(Topic::new("   ").is_err());
        assert!(Topic::new("anything-goes").is_ok());
    }

    #[test]
    fn single_server_status_decodes_as_batch_of_one() {
        let topic = Topic::new(Topic::SERVER_STATUS).unwrap();
        let event =
            StatusEvent::decode(&topic, json!({"serverId": "1", "serverStatus": "OFFLINE"})).unwrap();

        let statuses = event.server_statuses().unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].server_id, "1");
        assert_eq!(statuses[0].server_status, ServerHealth::Offline);
        assert!(statuses[0].server_url.is_none());
    }

    #[test]
    fn server_status_batch_decodes() {
        let topic = Topic::new(Topic::SERVER_STATUS).unwrap();
        let payload = json!([
            {"serverId": "a", "serverUrl": "https://a.example", "serverName": "A",
             "responseCode": "200", "latency": "35", "serverStatus": "ONLINE"},
            {"serverId": "b", "serverStatus": "CONNECT_ERROR"},
            {"serverId": "c", "serverStatus": "MAINTENANCE"}
        ]);

        let event = StatusEvent::decode(&topic, payload).unwrap();
        let statuses = event.server_statuses().unwrap();
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].latency.as_deref(), Some("35"));
        assert_eq!(statuses[1].server_status, ServerHealth::ConnectError);
        assert_eq!(statuses[2].server_status, ServerHealth::Unknown);
    }

    #[test]
    fn scheduler_status_decodes() {
        let topic = Topic::new(Topic::SCHEDULER_STATUS).unwrap();
        let event =
            StatusEvent::decode(&topic, json!({"type": "single-scheduler", "status": "RUNNING"}))
                .unwrap();

        assert_eq!(
            event,
            StatusEvent::SchedulerStatus(SchedulerStatus {
                kind: SchedulerKind::SingleScheduler,
                status: SchedulerState::Label("RUNNING".to_string()),
            })
        );
    }

    #[test]
    fn scheduler_status_accepts_boolean_flag() {
        let topic = Topic::new(Topic::SCHEDULER_STATUS).unwrap();
        let event =
            StatusEvent::decode(&topic, json!({"type": "main-scheduler", "status": true})).unwrap();

        match event {
            StatusEvent::SchedulerStatus(status) => {
                assert_eq!(status.kind, SchedulerKind::MainScheduler);
                assert_eq!(status.status, SchedulerState::Flag(true));
                assert!(status.status.is_running());
            }
            other => panic!("unexpected event {:?}", other),
        }

        assert!(!SchedulerState::Flag(false).is_running());
        assert!(!SchedulerState::Label("STOPPED".to_string()).is_running());
    }

    #[test]
    fn mismatched_shape_is_an_error() {
        let topic = Topic::new(Topic::SERVER_STATUS).unwrap();
        assert!(StatusEvent::decode(&topic, json!({"unexpected": true})).is_err());
    }

    #[test]
    fn unknown_topic_keeps_raw_json() {
        let topic = Topic::new("custom-topic").unwrap();
        let event = StatusEvent::decode(&topic, json!({"k": 1})).unwrap();
        assert_eq!(event, StatusEvent::Other(json!({"k": 1})));
    }
}
