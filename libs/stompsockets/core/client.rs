use crate::config::ClientConfig;
use crate::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::events::{InboundMessage, Topic};
use crate::policy::{ReconnectDecision, ReconnectPolicy};
use crate::protocol::{HandshakeOutcome, ProtocolAdapter, WireMode};
use crate::registry::{shared, SubscriptionId, SubscriptionRegistry};
use crate::traits::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Commands from the client handle to the connection task
#[derive(Debug)]
enum Command {
    /// Send an application message on the current connection
    Send {
        session: u64,
        destination: String,
        payload: serde_json::Value,
    },
    /// A topic gained its first listener
    SubscribeTopic(Topic),
    /// A topic lost its last listener
    ReleaseTopic(Topic),
    /// Drop the current connection and start over with a fresh attempt budget
    Reconnect,
    /// Close the connection and stop the task
    Shutdown,
}

/// Lifecycle events emitted by the connection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Handshake finished (or was skipped) and the connection is usable
    Connected { mode: WireMode },
    /// An established connection was lost
    Disconnected,
    /// Waiting to reopen after `n` consecutive failed attempts
    Reconnecting(usize),
    /// Framed protocol could not be negotiated; raw mode is active
    FellBackToRaw,
    /// Reconnection attempts are exhausted
    Failed { attempts: usize },
    /// A connection attempt or an established connection failed
    Error(String),
}

/// Client metrics snapshot
#[derive(Debug, Clone)]
pub struct Metrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_count: u64,
    pub parse_failures: u64,
    pub connection_state: ConnectionState,
}

/// Real-time status event client
///
/// The only object consumers touch. One background task owns the transport
/// and is the sole writer of the connection state; every call on this handle
/// either reads shared state or posts a command to that task, so nothing here
/// blocks on the network.
///
/// Subscriptions live in a registry that outlives individual connections:
/// each time a connection becomes usable, every topic with listeners is
/// subscribed again, exactly once.
pub struct EventClient {
    url: String,
    registry: Arc<SubscriptionRegistry>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    /// Number of the current connected session
    session: Arc<AtomicU64>,
    command_tx: mpsc::UnboundedSender<Command>,
    event_rx: Receiver<ClientEvent>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventClient {
    /// Create a client from configuration and start connecting
    ///
    /// Called by the builder's `build()` method.
    pub(crate) async fn new(config: ClientConfig) -> Result<Self> {
        let registry = Arc::new(SubscriptionRegistry::new());
        let state = Arc::new(AtomicConnectionState::new(ConnectionState::Disconnected));
        let metrics = Arc::new(AtomicMetrics::new());
        let session = Arc::new(AtomicU64::new(0));

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = unbounded();

        let url = config.url.clone();
        let task = ConnectionTask {
            heartbeat: config.protocol.heartbeat,
            adapter: ProtocolAdapter::new(config.protocol),
            policy: ReconnectPolicy::new(config.reconnect_strategy),
            url: config.url,
            transport: config.transport,
            handshake_timeout: config.handshake_timeout,
            registry: Arc::clone(&registry),
            state: Arc::clone(&state),
            metrics: Arc::clone(&metrics),
            session: Arc::clone(&session),
            command_rx,
            event_tx,
        };
        let task_handle = tokio::spawn(task.run());

        Ok(Self {
            url,
            registry,
            state,
            metrics,
            session,
            command_tx,
            event_rx,
            task_handle: Mutex::new(Some(task_handle)),
        })
    }

    /// Register `listener` for `topic`
    ///
    /// The first listener of a topic triggers a SUBSCRIBE on the live
    /// connection; later ones share it. Listeners stay registered across
    /// reconnects until [`Subscription::unsubscribe`] is called.
    pub fn subscribe<L>(&self, topic: &str, listener: L) -> Result<Subscription>
    where
        L: EventListener<InboundMessage>,
    {
        let topic = Topic::new(topic)?;
        let (id, first) = self.registry.add(topic.clone(), shared(listener));
        debug!("Listener {} registered for '{}'", id.value(), topic);

        if first && !topic.is_error() {
            // Task gone means the client is closed; the registration is inert
            let _ = self.command_tx.send(Command::SubscribeTopic(topic.clone()));
        }

        Ok(Subscription {
            id,
            topic,
            registry: Arc::clone(&self.registry),
            command_tx: self.command_tx.clone(),
        })
    }

    /// Send `payload` (serialized as JSON) to `destination`
    ///
    /// At most once: when the client is not connected the message is dropped
    /// with a warning and `false` is returned. Nothing is queued for a later
    /// connection.
    pub fn send<T>(&self, destination: &str, payload: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        if !self.state.is_connected() {
            warn!(
                "Dropping message to {}: not connected ({:?})",
                destination,
                self.state.get()
            );
            return false;
        }

        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dropping message to {}: {}", destination, e);
                return false;
            }
        };

        self.command_tx
            .send(Command::Send {
                session: self.session.load(Ordering::Acquire),
                destination: destination.to_string(),
                payload,
            })
            .is_ok()
    }

    /// Check if connected
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Get current connection state
    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Endpoint this client connects to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Drop the current connection (if any) and connect again
    ///
    /// Resets the attempt counter. This is the only way out of
    /// [`ConnectionState::Failed`].
    pub fn reconnect(&self) {
        if self.state.is_closed() || self.command_tx.send(Command::Reconnect).is_err() {
            warn!("reconnect() called on a closed client");
        }
    }

    /// Get current metrics
    pub fn metrics(&self) -> Metrics {
        Metrics {
            messages_sent: self.metrics.messages_sent(),
            messages_received: self.metrics.messages_received(),
            reconnect_count: self.metrics.reconnect_count(),
            parse_failures: self.metrics.parse_failures(),
            connection_state: self.state.get(),
        }
    }

    /// Number of listeners currently registered for `topic`
    pub fn listener_count(&self, topic: &str) -> usize {
        self.registry.listener_count(topic)
    }

    /// Try to receive a lifecycle event (non-blocking)
    pub fn try_recv_event(&self) -> Option<ClientEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive a lifecycle event (blocking)
    pub fn recv_event(&self) -> std::result::Result<ClientEvent, crossbeam_channel::RecvError> {
        self.event_rx.recv()
    }

    /// Close the connection and stop reconnecting
    ///
    /// Idempotent. Once the first call returns no listener is invoked again.
    pub async fn close(&self) {
        self.state.set(ConnectionState::Closed);
        let _ = self.command_tx.send(Command::Shutdown);

        let handle = self.task_handle.lock().take();
        if let Some(handle) = handle {
            info!("Closing event client for {}", self.url);
            if let Err(e) = handle.await {
                error!("Connection task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for EventClient {
    fn drop(&mut self) {
        // The task also stops once every command sender is gone, but a
        // Subscription handle may still hold one
        let _ = self.command_tx.send(Command::Shutdown);
    }
}

/// Handle to one listener registration
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    registry: Arc<SubscriptionRegistry>,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Remove exactly this listener; calling it again is a no-op
    ///
    /// When the topic has no listeners left its wire subscription is released.
    pub fn unsubscribe(&self) {
        let Some(removal) = self.registry.remove(self.id) else {
            return;
        };
        debug!("Listener {} removed from '{}'", self.id.value(), removal.topic);

        if removal.last && !removal.topic.is_error() {
            let _ = self.command_tx.send(Command::ReleaseTopic(removal.topic));
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

/// Why a connection session ended
#[derive(Debug)]
enum SessionEnd {
    /// Open or handshake failed
    Lost(String),
    /// An established connection dropped
    Dropped(String),
    /// Explicit reconnect requested
    Reconnect,
    /// Client closed
    Shutdown,
}

/// What the task does with a command while no connection is usable
enum Idle {
    Continue,
    End(SessionEnd),
}

/// Connection manager: owns the transport, the protocol adapter and the
/// reconnection policy
struct ConnectionTask {
    url: String,
    transport: Arc<dyn Transport>,
    handshake_timeout: Duration,
    heartbeat: Option<Duration>,
    adapter: ProtocolAdapter,
    policy: ReconnectPolicy,
    registry: Arc<SubscriptionRegistry>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    session: Arc<AtomicU64>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: Sender<ClientEvent>,
}

impl ConnectionTask {
    async fn run(mut self) {
        loop {
            let (decision, reason) = match self.run_session().await {
                SessionEnd::Shutdown => break,
                SessionEnd::Reconnect => {
                    info!("Manual reconnect requested");
                    self.policy.reset();
                    self.metrics.increment_reconnects();
                    continue;
                }
                SessionEnd::Lost(reason) => (self.policy.record_failure(), reason),
                SessionEnd::Dropped(reason) => (self.policy.on_connection_lost(), reason),
            };

            if !self.state.set_unless_closed(ConnectionState::Disconnected) {
                break;
            }

            match decision {
                ReconnectDecision::Retry(delay) => {
                    let attempt = self.policy.attempt();
                    info!(
                        "Reconnecting to {} in {:?} ({} failed attempts, last: {})",
                        self.url, delay, attempt, reason
                    );
                    let _ = self.event_tx.send(ClientEvent::Reconnecting(attempt));

                    match self.wait(Some(delay)).await {
                        Some(SessionEnd::Shutdown) => break,
                        Some(SessionEnd::Reconnect) => {
                            self.policy.reset();
                        }
                        _ => {}
                    }
                    self.metrics.increment_reconnects();
                }
                ReconnectDecision::GiveUp { attempts } => {
                    if !self.state.set_unless_closed(ConnectionState::Failed) {
                        break;
                    }
                    error!(
                        "Giving up on {} after {} failed attempts: {}",
                        self.url, attempts, reason
                    );
                    let _ = self.event_tx.send(ClientEvent::Failed { attempts });
                    self.registry.dispatch(&InboundMessage::connection_lost(attempts));

                    match self.wait(None).await {
                        Some(SessionEnd::Reconnect) => {
                            info!("Leaving failed state on manual reconnect");
                            self.policy.reset();
                            self.metrics.increment_reconnects();
                        }
                        _ => break,
                    }
                }
            }
        }

        self.state.set(ConnectionState::Closed);
        info!("Connection task for {} exiting", self.url);
    }

    /// Wait for `delay` (or indefinitely) while servicing commands
    ///
    /// Returns early with `Reconnect` or `Shutdown`.
    async fn wait(&mut self, delay: Option<Duration>) -> Option<SessionEnd> {
        let sleep = async {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return None,
                command = self.command_rx.recv() => {
                    if let Idle::End(end) = self.idle_command(command) {
                        return Some(end);
                    }
                }
            }
        }
    }

    /// Handle a command that arrives while no connection is usable
    fn idle_command(&self, command: Option<Command>) -> Idle {
        match command {
            Some(Command::Send { destination, .. }) => {
                warn!("Dropping message to {}: not connected", destination);
                Idle::Continue
            }
            // The registry is replayed when the next connection comes up
            Some(Command::SubscribeTopic(_)) | Some(Command::ReleaseTopic(_)) => Idle::Continue,
            Some(Command::Reconnect) => Idle::End(SessionEnd::Reconnect),
            Some(Command::Shutdown) | None => Idle::End(SessionEnd::Shutdown),
        }
    }

    /// Open, handshake, replay and serve one connection
    async fn run_session(&mut self) -> SessionEnd {
        if !self.state.set_unless_closed(ConnectionState::Connecting) {
            return SessionEnd::Shutdown;
        }
        self.adapter.begin_session();
        debug!("Opening connection to {}", self.url);

        let transport = Arc::clone(&self.transport);
        let url = self.url.clone();
        let open = transport.open(&url);
        tokio::pin!(open);

        let mut stream = loop {
            tokio::select! {
                result = &mut open => match result {
                    Ok(stream) => break stream,
                    Err(e) => {
                        warn!("Failed to connect to {}: {}", url, e);
                        let _ = self.event_tx.send(ClientEvent::Error(e.to_string()));
                        return SessionEnd::Lost(e.to_string());
                    }
                },
                command = self.command_rx.recv() => {
                    if let Idle::End(end) = self.idle_command(command) {
                        return end;
                    }
                }
            }
        };

        if let Err(end) = self.handshake(&mut *stream).await {
            stream.close().await;
            return end;
        }

        // Sends accepted before this point belong to an earlier connection
        let session = self.session.fetch_add(1, Ordering::AcqRel) + 1;
        if !self.state.set_unless_closed(ConnectionState::Connected) {
            self.close_gracefully(&mut *stream).await;
            return SessionEnd::Shutdown;
        }
        self.policy.on_connected();
        let mode = self.adapter.mode();
        info!("Connected to {} ({:?} mode)", self.url, mode);
        let _ = self.event_tx.send(ClientEvent::Connected { mode });

        let end = match self.replay_subscriptions(&mut *stream).await {
            Ok(()) => self.serve(&mut *stream, session).await,
            Err(e) => SessionEnd::Lost(e.to_string()),
        };

        match end {
            SessionEnd::Lost(reason) | SessionEnd::Dropped(reason) => {
                warn!("Connection to {} lost: {}", self.url, reason);
                stream.close().await;
                let _ = self.event_tx.send(ClientEvent::Error(reason.clone()));
                let _ = self.event_tx.send(ClientEvent::Disconnected);
                SessionEnd::Dropped(reason)
            }
            other => other,
        }
    }

    /// Negotiate the framed protocol, falling back to raw mode
    async fn handshake(
        &mut self,
        stream: &mut dyn TransportStream,
    ) -> std::result::Result<(), SessionEnd> {
        if !self.adapter.needs_handshake() {
            return Ok(());
        }
        if !self.state.set_unless_closed(ConnectionState::HandshakePending) {
            return Err(SessionEnd::Shutdown);
        }

        if let Err(e) = stream.send(self.adapter.connect_frame()).await {
            return Err(SessionEnd::Lost(format!("failed to send CONNECT: {}", e)));
        }
        self.metrics.increment_sent();

        let deadline = tokio::time::sleep(self.handshake_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                message = stream.recv() => match message {
                    Some(Ok(message)) => {
                        self.metrics.increment_received();
                        match self.adapter.on_handshake_message(&message) {
                            HandshakeOutcome::Connected { version } => {
                                debug!("STOMP session established (version {:?})", version);
                                return Ok(());
                            }
                            HandshakeOutcome::Pending => continue,
                            HandshakeOutcome::FellBack { reason, carried } => {
                                warn!("Falling back to raw mode: {}", reason);
                                let _ = self.event_tx.send(ClientEvent::FellBackToRaw);
                                self.deliver(carried);
                                return Ok(());
                            }
                        }
                    }
                    Some(Err(e)) => return Err(SessionEnd::Lost(e.to_string())),
                    None => {
                        return Err(SessionEnd::Lost(
                            "connection closed during handshake".to_string(),
                        ))
                    }
                },
                _ = &mut deadline => {
                    warn!(
                        "No CONNECTED frame within {:?}, falling back to raw mode",
                        self.handshake_timeout
                    );
                    self.adapter.fall_back_to_raw();
                    let _ = self.event_tx.send(ClientEvent::FellBackToRaw);
                    return Ok(());
                }
                command = self.command_rx.recv() => {
                    if let Idle::End(end) = self.idle_command(command) {
                        return Err(end);
                    }
                }
            }
        }
    }

    /// Subscribe every topic that currently has listeners
    async fn replay_subscriptions(&mut self, stream: &mut dyn TransportStream) -> Result<()> {
        for topic in self.registry.topics_snapshot() {
            if let Some(frame) = self.adapter.subscribe(&topic) {
                stream.send(frame).await?;
                self.metrics.increment_sent();
                debug!("Subscribed to '{}'", topic);
            }
        }
        Ok(())
    }

    /// Main message loop for a usable connection
    async fn serve(&mut self, stream: &mut dyn TransportStream, session: u64) -> SessionEnd {
        let mut heartbeat = match (self.heartbeat, self.adapter.mode()) {
            (Some(interval), WireMode::Framed) => Some(tokio::time::interval_at(
                tokio::time::Instant::now() + interval,
                interval,
            )),
            _ => None,
        };

        loop {
            tokio::select! {
                message = stream.recv() => match message {
                    Some(Ok(message)) => {
                        self.metrics.increment_received();
                        let parsed = self.adapter.parse(&message);
                        self.deliver(parsed);
                    }
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost("connection closed by peer".to_string()),
                },
                command = self.command_rx.recv() => {
                    let outbound = match command {
                        Some(Command::Send { session: sent_in, destination, .. }) if sent_in != session => {
                            warn!("Dropping message to {}: accepted by an earlier connection", destination);
                            None
                        }
                        Some(Command::Send { destination, payload, .. }) => {
                            match self.adapter.send_message(&destination, &payload) {
                                Ok(message) => Some(message),
                                Err(e) => {
                                    warn!("Dropping message to {}: {}", destination, e);
                                    None
                                }
                            }
                        }
                        Some(Command::SubscribeTopic(topic)) => {
                            if self.registry.has_listeners(topic.as_str()) {
                                self.adapter.subscribe(&topic)
                            } else {
                                None
                            }
                        }
                        Some(Command::ReleaseTopic(topic)) => {
                            if self.registry.has_listeners(topic.as_str()) {
                                None
                            } else {
                                self.adapter.unsubscribe(&topic)
                            }
                        }
                        Some(Command::Reconnect) => {
                            self.close_gracefully(stream).await;
                            return SessionEnd::Reconnect;
                        }
                        Some(Command::Shutdown) | None => {
                            self.close_gracefully(stream).await;
                            return SessionEnd::Shutdown;
                        }
                    };

                    if let Some(message) = outbound {
                        if let Err(e) = stream.send(message).await {
                            return SessionEnd::Lost(e.to_string());
                        }
                        self.metrics.increment_sent();
                    }
                }
                _ = async {
                    match heartbeat.as_mut() {
                        Some(interval) => {
                            interval.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    if let Some(frame) = self.adapter.heartbeat_frame() {
                        if let Err(e) = stream.send(frame).await {
                            return SessionEnd::Lost(format!("failed to send heart-beat: {}", e));
                        }
                    }
                }
            }
        }
    }

    /// Dispatch decoded messages; malformed ones are logged and dropped
    fn deliver(&self, parsed: Vec<Result<InboundMessage>>) {
        for result in parsed {
            match result {
                Ok(message) => {
                    let delivered = self.registry.dispatch(&message);
                    if delivered == 0 {
                        debug!("No listeners for '{}'", message.topic);
                    }
                }
                Err(e) => {
                    self.metrics.increment_parse_failures();
                    warn!("Discarding malformed message: {}", e);
                }
            }
        }
    }

    async fn close_gracefully(&self, stream: &mut dyn TransportStream) {
        if let Some(frame) = self.adapter.disconnect_frame() {
            if stream.send(frame).await.is_ok() {
                self.metrics.increment_sent();
            }
        }
        stream.close().await;
        let _ = self.event_tx.send(ClientEvent::Disconnected);
    }
}
