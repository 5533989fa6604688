use crate::error::Result;

/// Event listener registered against a topic
///
/// Listeners are invoked synchronously on the connection task, in the order
/// they were registered. A slow listener therefore delays delivery to every
/// other listener and, if it blocks long enough, backs up the socket's
/// receive buffer. Hand heavy work off to another task or thread.
///
/// Returning an error (or panicking) is logged and does not affect the
/// remaining listeners of the same dispatch.
///
/// Any `Fn(&M) -> Result<()>` closure is a listener:
///
/// ```ignore
/// client.subscribe(Topic::SERVER_STATUS, |msg: &InboundMessage| {
///     println!("{:?}", msg.event);
///     Ok(())
/// })?;
/// ```
pub trait EventListener<M>: Send + Sync + 'static {
    /// Handle one delivered message
    fn on_event(&self, message: &M) -> Result<()>;
}

impl<M, F> EventListener<M> for F
where
    F: Fn(&M) -> Result<()> + Send + Sync + 'static,
{
    fn on_event(&self, message: &M) -> Result<()> {
        self(message)
    }
}
