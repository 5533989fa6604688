use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Connection lifecycle state
///
/// ```text
/// Disconnected ─> Connecting ─> HandshakePending ─> Connected
///       ^              │                │               │
///       └──────────────┴──── backoff ───┴───────────────┘
///                      │
///                      └─> Failed (attempts exhausted)
/// any ─> Closed (explicit close)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    HandshakePending = 2,
    Connected = 3,
    Failed = 4,
    Closed = 5,
}

impl ConnectionState {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::HandshakePending,
            3 => ConnectionState::Connected,
            4 => ConnectionState::Failed,
            5 => ConnectionState::Closed,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Lock-free connection state shared between the client handle and its task
#[derive(Debug)]
pub struct AtomicConnectionState {
    state: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(initial: ConnectionState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Atomically move from `current` to `new`; returns the observed state on failure
    pub fn compare_exchange(
        &self,
        current: ConnectionState,
        new: ConnectionState,
    ) -> Result<ConnectionState, ConnectionState> {
        self.state
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(ConnectionState::from_u8)
            .map_err(ConnectionState::from_u8)
    }

    /// Set `new` unless the state is already `Closed`
    ///
    /// Returns `false` when the client has been closed.
    pub fn set_unless_closed(&self, new: ConnectionState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == ConnectionState::Closed as u8 {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                new as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.get() == ConnectionState::Failed
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.get() == ConnectionState::Closed
    }
}

/// Lock-free counters
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    reconnect_count: AtomicU64,
    parse_failures: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_parse_failures(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn parse_failures(&self) -> u64 {
        self.parse_failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_is_sticky_for_set_unless_closed() {
        let state = AtomicConnectionState::new(ConnectionState::Connecting);
        assert!(state.set_unless_closed(ConnectionState::Connected));
        assert!(state.is_connected());

        state.set(ConnectionState::Closed);
        assert!(!state.set_unless_closed(ConnectionState::Connecting));
        assert!(state.is_closed());
    }

    #[test]
    fn compare_exchange_reports_observed_state() {
        let state = AtomicConnectionState::new(ConnectionState::Failed);
        assert_eq!(
            state.compare_exchange(ConnectionState::Connected, ConnectionState::Disconnected),
            Err(ConnectionState::Failed)
        );
        assert_eq!(
            state.compare_exchange(ConnectionState::Failed, ConnectionState::Disconnected),
            Ok(ConnectionState::Failed)
        );
        assert_eq!(state.get(), ConnectionState::Disconnected);
    }
}
