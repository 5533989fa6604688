use std::time::Duration;

/// Default number of consecutive failed attempts before giving up
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Default flat interval between attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);

/// Trait for defining reconnection strategies
///
/// Implement this trait to control how the client should
/// behave when reconnecting after a disconnection.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the next reconnection attempt
    ///
    /// # Arguments
    /// * `attempt` - Number of consecutive failed attempts so far (1 after the first failure)
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before reconnecting
    /// * `None` - Stop reconnecting
    fn next_delay(&self, attempt: usize) -> Option<Duration>;

    /// Reset the strategy state (called after successful connection)
    fn reset(&mut self);

    /// Check if we should continue reconnecting
    ///
    /// # Arguments
    /// * `attempt` - Number of consecutive failed attempts so far
    ///
    /// # Returns
    /// * `true` - Continue reconnecting
    /// * `false` - Stop reconnecting
    fn should_reconnect(&self, attempt: usize) -> bool;

    /// Upper bound on consecutive failed attempts (`None` = unlimited)
    fn max_attempts(&self) -> Option<usize>;
}

/// Fixed delay reconnection strategy
///
/// Always waits the same amount of time between reconnection attempts.
/// The delay never grows with the attempt number.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
}

impl FixedDelay {
    /// Create a new fixed delay strategy
    ///
    /// # Arguments
    /// * `delay` - The fixed delay between reconnects
    /// * `max_attempts` - Maximum number of failed attempts (None = unlimited)
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self { delay, max_attempts }
    }

    /// The configured delay
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_INTERVAL, Some(DEFAULT_MAX_ATTEMPTS))
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_reconnect(attempt) {
            return None;
        }
        Some(self.delay)
    }

    fn reset(&mut self) {
        // No state to reset for fixed delay
    }

    fn should_reconnect(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }
}

/// Never reconnect strategy
///
/// The first failed attempt moves the client straight to `Failed`.
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _attempt: usize) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {
        // No state to reset
    }

    fn should_reconnect(&self, _attempt: usize) -> bool {
        false
    }

    fn max_attempts(&self) -> Option<usize> {
        Some(1)
    }
}
