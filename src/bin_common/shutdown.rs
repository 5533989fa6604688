//! Graceful shutdown handling
//!
//! Provides a Ctrl+C handler and a shared running flag for the main loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Manages graceful shutdown via Ctrl+C signal handling
#[derive(Clone)]
pub struct ShutdownManager {
    flag: Arc<AtomicBool>,
}

impl ShutdownManager {
    /// Create a new shutdown manager (running state)
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Spawn a background task that clears the flag on Ctrl+C
    pub fn spawn_signal_handler(&self) {
        let flag = Arc::clone(&self.flag);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("");
                    info!("Received Ctrl+C, shutting down gracefully...");
                    flag.store(false, Ordering::Release);
                }
                Err(e) => {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                }
            }
        });
    }

    /// Check if the application should continue running
    pub fn is_running(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Request shutdown without a signal
    pub fn trigger(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Get a clone of the shutdown flag for passing to other components
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Sleep for `duration`, waking early once shutdown is requested
    ///
    /// Returns `true` if still running after the sleep.
    pub async fn interruptible_sleep(&self, duration: Duration) -> bool {
        let check_interval = Duration::from_millis(50);
        let mut remaining = duration;

        while !remaining.is_zero() && self.is_running() {
            let step = remaining.min(check_interval);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }

        self.is_running()
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
