use crate::error::Result;
use crate::message::WsMessage;
use async_trait::async_trait;

/// Trait for opening physical duplex connections
///
/// A transport knows how to reach an endpoint and nothing about the
/// messages that flow over it. The client opens at most one stream at a
/// time; every call to `open` yields exactly one outcome:
///
/// * `Ok(stream)` - the connection is open (the "open" event)
/// * `Err(..)` - the attempt failed (the "close" event for this attempt)
///
/// Implementations must fail fast (without touching the network) when the
/// address is malformed.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new connection to `url`
    async fn open(&self, url: &str) -> Result<Box<dyn TransportStream>>;
}

/// An open connection produced by a [`Transport`]
///
/// `recv` yields zero or more messages and then `None` (clean close) or an
/// error (connection lost). Both end the stream.
#[async_trait]
pub trait TransportStream: Send {
    /// Send a message to the peer
    async fn send(&mut self, message: WsMessage) -> Result<()>;

    /// Receive the next data message
    ///
    /// Must be cancel-safe: it is polled inside `tokio::select!`.
    async fn recv(&mut self) -> Option<Result<WsMessage>>;

    /// Close the connection
    ///
    /// Idempotent. Once it returns, `recv` produces no further messages.
    async fn close(&mut self);
}
