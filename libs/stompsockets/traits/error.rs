use thiserror::Error;

/// Main error type for stompsockets
#[derive(Error, Debug)]
pub enum StompSocketError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Endpoint address could not be turned into a connection request
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Message parsing error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Malformed STOMP frame
    #[error("Frame error: {0}")]
    Frame(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Topic name rejected by the registry
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Listener callback failed
    #[error("Listener error: {0}")]
    Listener(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,
}

impl From<serde_json::Error> for StompSocketError {
    fn from(e: serde_json::Error) -> Self {
        StompSocketError::ParseError(e.to_string())
    }
}

/// Result type for stompsockets operations
pub type Result<T> = std::result::Result<T, StompSocketError>;
