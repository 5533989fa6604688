//! # Event client core
//!
//! Connection management, the STOMP/raw protocol adapter, the subscription
//! registry and the type-state builder.
//!
//! ## Example
//!
//! ```rust,ignore
//! use stompsockets::{InboundMessage, Topic};
//!
//! #[tokio::main]
//! async fn main() -> stompsockets::Result<()> {
//!     let client = stompsockets::builder()
//!         .url("ws://localhost:8082/serv-stat")
//!         .build()
//!         .await?;
//!
//!     let subscription = client.subscribe(Topic::SERVER_STATUS, |msg: &InboundMessage| {
//!         println!("{:?}", msg.event);
//!         Ok(())
//!     })?;
//!
//!     // ...
//!
//!     subscription.unsubscribe();
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod connection_state;
pub mod events;
pub mod policy;
pub mod protocol;
pub mod registry;
pub mod websocket;

// Re-export main types
pub use builder::{states, EventClientBuilder};
pub use client::{ClientEvent, EventClient, Metrics, Subscription};
pub use config::ClientConfig;
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
pub use events::{
    ConnectionLost, InboundMessage, SchedulerKind, SchedulerState, SchedulerStatus, ServerHealth,
    ServerStatusUpdate, StatusEvent, Topic,
};
pub use policy::{ReconnectDecision, ReconnectPolicy};
pub use protocol::{DestinationMap, ProtocolMode, WireMode};
pub use registry::{SubscriptionId, SubscriptionRegistry};
pub use websocket::TungsteniteTransport;

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new event client builder
///
/// # Example
/// ```ignore
/// let client = stompsockets::builder()
///     .url("ws://localhost:8082/serv-stat")
///     .protocol(ProtocolMode::Stomp)
///     .heartbeat(Duration::from_secs(10))
///     .build()
///     .await?;
/// ```
pub fn builder() -> EventClientBuilder<builder::states::NoUrl> {
    EventClientBuilder::new()
}
