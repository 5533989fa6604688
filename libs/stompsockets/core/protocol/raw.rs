//! Raw JSON fallback channel
//!
//! When the framed protocol cannot be negotiated every inbound payload is a
//! self-describing message:
//!
//! ```text
//! { "type": "server-status-update", "data": { ... }, "timestamp": "2024-05-01T10:00:00Z" }
//! ```
//!
//! `type` is the topic. Several messages may arrive in one payload,
//! newline-delimited or simply concatenated.

use crate::error::{Result, StompSocketError};
use crate::events::{InboundMessage, Topic};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Parse every raw message contained in `text`
///
/// Each message decodes independently; a syntax error ends the payload since
/// nothing after it can be framed reliably.
pub fn parse_raw(text: &str) -> Vec<Result<InboundMessage>> {
    let mut messages = Vec::new();

    for envelope in serde_json::Deserializer::from_str(text).into_iter::<RawEnvelope>() {
        match envelope {
            Ok(envelope) => messages.push(decode_envelope(envelope)),
            Err(e) => {
                messages.push(Err(e.into()));
                break;
            }
        }
    }

    messages
}

fn decode_envelope(envelope: RawEnvelope) -> Result<InboundMessage> {
    let topic = Topic::new(envelope.kind).map_err(|_| {
        StompSocketError::ParseError("raw message has an empty 'type'".to_string())
    })?;
    let sent_at = envelope.timestamp.as_deref().and_then(parse_timestamp);
    Ok(InboundMessage::decode(topic, envelope.data)?.with_sent_at(sent_at))
}

/// ISO-8601 timestamp, with or without an offset (naive values are UTC)
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    match raw.parse::<chrono::NaiveDateTime>() {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) => {
            debug!("Ignoring unparseable raw timestamp '{}': {}", raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ServerHealth, StatusEvent};
    use chrono::TimeZone;

    #[test]
    fn parses_single_message() {
        let text = r#"{"type":"server-status-update","data":{"serverId":"1","serverStatus":"ONLINE"},"timestamp":"2024-05-01T10:00:00Z"}"#;
        let messages: Vec<_> = parse_raw(text).into_iter().map(|m| m.unwrap()).collect();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic.as_str(), Topic::SERVER_STATUS);
        assert_eq!(
            messages[0].sent_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
        let statuses = messages[0].event.server_statuses().unwrap();
        assert_eq!(statuses[0].server_status, ServerHealth::Online);
    }

    #[test]
    fn parses_newline_delimited_stream() {
        let text = concat!(
            r#"{"type":"scheduler-status-update","data":{"type":"main-scheduler","status":"STOPPED"}}"#,
            "\n",
            r#"{"type":"custom","data":[1,2,3],"timestamp":"2024-05-01T10:00:00.123"}"#,
            "\n"
        );
        let messages: Vec<_> = parse_raw(text).into_iter().map(|m| m.unwrap()).collect();

        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0].event, StatusEvent::SchedulerStatus(_)));
        assert_eq!(messages[1].topic.as_str(), "custom");
        assert!(messages[1].sent_at.is_some());
    }

    #[test]
    fn rejects_malformed_json() {
        for text in ["{not json", r#"{"data":{}}"#, r#"{"type":"","data":{}}"#] {
            let parsed = parse_raw(text);
            assert_eq!(parsed.len(), 1, "{}", text);
            assert!(parsed[0].is_err(), "{}", text);
        }
    }

    #[test]
    fn bad_message_does_not_poison_its_neighbours() {
        let text = concat!(
            r#"{"type":"server-status-update","data":{"wrong":"shape"}}"#,
            "\n",
            r#"{"type":"custom","data":1}"#
        );
        let parsed = parse_raw(text);

        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].is_err());
        assert_eq!(parsed[1].as_ref().unwrap().topic.as_str(), "custom");
    }

    #[test]
    fn bad_timestamp_is_ignored() {
        let parsed = parse_raw(r#"{"type":"custom","data":null,"timestamp":"yesterday"}"#);
        assert!(parsed[0].as_ref().unwrap().sent_at.is_none());
    }
}
