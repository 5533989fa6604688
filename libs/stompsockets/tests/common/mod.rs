//! Common test utilities for StompSockets integration tests
//!
//! Provides a mock STOMP-over-WebSocket server, a transport that always
//! fails, and polling helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stompsockets::protocol::frame::{decode_frames, Command};
use stompsockets::{Result, StompSocketError, Transport, TransportStream, TungsteniteTransport};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// How the mock server answers a CONNECT frame
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Reply with CONNECTED
    Stomp,
    /// Never reply
    Silent,
    /// Reply with this raw (non-STOMP) payload instead of CONNECTED
    RawFirst(String),
}

#[derive(Debug, Clone)]
enum Control {
    Push(String),
    DropAll,
}

/// A mock WebSocket server speaking just enough STOMP for the client
pub struct MockStompServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    control: broadcast::Sender<Control>,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl MockStompServer {
    /// Create and start a new mock server
    pub async fn start(behaviour: Behaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let (control, _) = broadcast::channel(64);
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        {
            let shutdown = Arc::clone(&shutdown);
            let control = control.clone();
            let received = Arc::clone(&received);
            let connections = Arc::clone(&connections);

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        result = listener.accept() => {
                            match result {
                                Ok((stream, _)) => {
                                    let behaviour = behaviour.clone();
                                    let control_rx = control.subscribe();
                                    let received = Arc::clone(&received);
                                    let shutdown = Arc::clone(&shutdown);
                                    connections.fetch_add(1, Ordering::SeqCst);
                                    tokio::spawn(async move {
                                        Self::handle_connection(
                                            stream, behaviour, control_rx, received, shutdown,
                                        )
                                        .await;
                                    });
                                }
                                Err(e) => {
                                    eprintln!("Accept error: {}", e);
                                    break;
                                }
                            }
                        }
                        _ = shutdown.notified() => {
                            break;
                        }
                    }
                }
            });
        }

        Self {
            addr,
            shutdown,
            control,
            received,
            connections,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        behaviour: Behaviour,
        mut control_rx: broadcast::Receiver<Control>,
        received: Arc<Mutex<Vec<String>>>,
        shutdown: Arc<Notify>,
    ) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_async;
        use tokio_tungstenite::tungstenite::Message;

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            received.lock().push(text.clone());
                            let is_connect = decode_frames(&text)
                                .map(|frames| frames.iter().any(|f| f.command == Command::Connect))
                                .unwrap_or(false);
                            if !is_connect {
                                continue;
                            }
                            let reply = match &behaviour {
                                Behaviour::Stomp => {
                                    Some("CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0".to_string())
                                }
                                Behaviour::Silent => None,
                                Behaviour::RawFirst(payload) => Some(payload.clone()),
                            };
                            if let Some(reply) = reply {
                                if write.send(Message::Text(reply)).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                control = control_rx.recv() => {
                    match control {
                        Ok(Control::Push(text)) => {
                            if write.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        // Dropping the socket without a close frame
                        Ok(Control::DropAll) => break,
                        Err(_) => break,
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}/serv-stat", self.addr)
    }

    /// Send `text` to every connected client
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.control.send(Control::Push(text.into()));
    }

    /// Abruptly drop every open connection
    pub fn drop_connections(&self) {
        let _ = self.control.send(Control::DropAll);
    }

    /// Number of WebSocket connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Every text message received from clients, in order
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Received frames whose command line is `command`
    pub fn frames(&self, command: &str) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .filter(|text| text.starts_with(&format!("{}\n", command)))
            .cloned()
            .collect()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockStompServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A STOMP MESSAGE frame for `destination`
pub fn message_frame(destination: &str, body: &str) -> String {
    format!(
        "MESSAGE\ndestination:{}\nmessage-id:1\ncontent-type:application/json\n\n{}\0",
        destination, body
    )
}

/// Transport whose every `open` fails, counting the attempts
#[derive(Clone, Default)]
pub struct FailingTransport {
    opens: Arc<AtomicUsize>,
}

impl FailingTransport {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn TransportStream>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Err(StompSocketError::WebSocket(format!("connection to {} refused", url)))
    }
}

/// Transport that lets the first `healthy` opens through, then refuses
#[derive(Clone)]
pub struct FlakyTransport {
    inner: Arc<TungsteniteTransport>,
    healthy: usize,
    opens: Arc<AtomicUsize>,
}

impl FlakyTransport {
    pub fn new(healthy: usize) -> Self {
        Self {
            inner: Arc::new(TungsteniteTransport::new(Duration::from_secs(2))),
            healthy,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn TransportStream>> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.healthy {
            self.inner.open(url).await
        } else {
            Err(StompSocketError::WebSocket(format!("connection to {} refused", url)))
        }
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Shared log of messages delivered to a listener
pub type Delivered = Arc<Mutex<Vec<stompsockets::InboundMessage>>>;

/// A listener that records every delivery into `log`
pub fn recording_listener(
    log: &Delivered,
) -> impl Fn(&stompsockets::InboundMessage) -> Result<()> + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |message: &stompsockets::InboundMessage| {
        log.lock().push(message.clone());
        Ok(())
    }
}
