//! Reconnection policy
//!
//! Wraps a [`ReconnectionStrategy`] with the consecutive-failure counter the
//! connection manager needs. The counter resets on every successful
//! handshake, so the limit bounds *consecutive* failed opens only. Losing an
//! established connection is not itself a failed open.

use crate::reconnect::ReconnectionStrategy;
use std::time::Duration;

/// What to do after a failed or lost connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait this long, then open a new connection
    Retry(Duration),
    /// Stop; the client is now failed
    GiveUp { attempts: usize },
}

pub struct ReconnectPolicy {
    strategy: Box<dyn ReconnectionStrategy>,
    attempt: usize,
}

impl ReconnectPolicy {
    pub fn new(strategy: Box<dyn ReconnectionStrategy>) -> Self {
        Self {
            strategy,
            attempt: 0,
        }
    }

    /// A connection reached the connected state
    pub fn on_connected(&mut self) {
        self.attempt = 0;
        self.strategy.reset();
    }

    /// An open or handshake failed
    pub fn record_failure(&mut self) -> ReconnectDecision {
        self.attempt += 1;
        self.decide()
    }

    /// An established connection went away
    ///
    /// Starts a retry cycle without counting the loss itself; only the
    /// reopens that fail count against the limit.
    pub fn on_connection_lost(&mut self) -> ReconnectDecision {
        self.decide()
    }

    fn decide(&self) -> ReconnectDecision {
        match self.strategy.next_delay(self.attempt) {
            Some(delay) => ReconnectDecision::Retry(delay),
            None => ReconnectDecision::GiveUp {
                attempts: self.attempt,
            },
        }
    }

    /// Start counting from zero again (manual reconnect)
    pub fn reset(&mut self) {
        self.on_connected();
    }

    /// Consecutive failed opens so far
    #[inline]
    pub fn attempt(&self) -> usize {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconnect::{FixedDelay, NeverReconnect};

    #[test]
    fn gives_up_after_max_consecutive_failures() {
        let mut policy = ReconnectPolicy::new(Box::new(FixedDelay::new(
            Duration::from_millis(10),
            Some(3),
        )));

        assert_eq!(policy.record_failure(), ReconnectDecision::Retry(Duration::from_millis(10)));
        assert_eq!(policy.record_failure(), ReconnectDecision::Retry(Duration::from_millis(10)));
        assert_eq!(policy.record_failure(), ReconnectDecision::GiveUp { attempts: 3 });
    }

    #[test]
    fn success_resets_the_counter() {
        let mut policy = ReconnectPolicy::new(Box::new(FixedDelay::new(
            Duration::from_millis(10),
            Some(2),
        )));

        policy.record_failure();
        policy.on_connected();
        assert_eq!(policy.attempt(), 0);
        assert!(matches!(policy.record_failure(), ReconnectDecision::Retry(_)));
    }

    #[test]
    fn lost_connection_is_not_a_failed_attempt() {
        let mut policy = ReconnectPolicy::new(Box::new(FixedDelay::new(
            Duration::from_millis(10),
            Some(1),
        )));

        policy.on_connected();
        assert_eq!(policy.on_connection_lost(), ReconnectDecision::Retry(Duration::from_millis(10)));
        assert_eq!(policy.attempt(), 0);
        assert_eq!(policy.record_failure(), ReconnectDecision::GiveUp { attempts: 1 });
    }

    #[test]
    fn never_reconnect_gives_up_immediately() {
        let mut policy = ReconnectPolicy::new(Box::new(NeverReconnect));
        assert_eq!(policy.on_connection_lost(), ReconnectDecision::GiveUp { attempts: 0 });
        assert_eq!(policy.record_failure(), ReconnectDecision::GiveUp { attempts: 1 });
    }

    #[test]
    fn unlimited_keeps_retrying() {
        let mut policy = ReconnectPolicy::new(Box::new(FixedDelay::new(Duration::ZERO, None)));
        for _ in 0..100 {
            assert_eq!(policy.record_failure(), ReconnectDecision::Retry(Duration::ZERO));
        }
    }
}
