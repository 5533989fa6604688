//! # StompSockets Traits
//!
//! Core traits and types for the StompSockets event client.
//!
//! - **Transport / TransportStream**: Open and drive one physical connection
//! - **EventListener**: Receive messages dispatched for a topic
//! - **ReconnectionStrategy**: Control reconnection behavior
//! - **WsMessage**: Transport-level message
//!
//! ## Example
//!
//! ```rust,ignore
//! use stompsockets::traits::*;
//!
//! struct LoopbackTransport;
//!
//! #[async_trait]
//! impl Transport for LoopbackTransport {
//!     async fn open(&self, url: &str) -> Result<Box<dyn TransportStream>> {
//!         // Your connection logic here
//!     }
//! }
//! ```

pub mod error;
pub mod listener;
pub mod message;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use error::{Result, StompSocketError};
pub use listener::EventListener;
pub use message::WsMessage;
pub use reconnect::{
    FixedDelay, NeverReconnect, ReconnectionStrategy, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RECONNECT_INTERVAL,
};
pub use transport::{Transport, TransportStream};
