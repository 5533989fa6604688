//! # StompSockets
//!
//! A self-healing client for server-push status events over WebSocket.
//!
//! ## Features
//!
//! - **STOMP with raw fallback**: negotiates STOMP 1.2 and drops to
//!   self-describing JSON messages when the peer does not speak it
//! - **Survives reconnects**: subscriptions are replayed on every new
//!   connection, exactly once per topic
//! - **Bounded retries**: flat reconnect interval, terminal `error` event
//!   when attempts run out
//! - **Typed events**: server and scheduler status payloads decode into
//!   [`StatusEvent`]
//! - **Type-state builder**: the endpoint URL is required at compile time

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use self::core::{
    builder, client, config, connection_state, events, policy, protocol, registry, websocket,
    builder::{states, EventClientBuilder},
    client::{ClientEvent, EventClient, Metrics, Subscription},
    config::ClientConfig,
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState},
    events::{
        ConnectionLost, InboundMessage, SchedulerKind, SchedulerState, SchedulerStatus,
        ServerHealth, ServerStatusUpdate, StatusEvent, Topic,
    },
    policy::{ReconnectDecision, ReconnectPolicy},
    protocol::{DestinationMap, ProtocolMode, WireMode},
    registry::{SubscriptionId, SubscriptionRegistry},
    websocket::TungsteniteTransport,
};

// Convenience function
pub use self::core::builder as client_builder;
