//! Tracing setup shared by binaries

use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber
///
/// `RUST_LOG` wins when set; otherwise `log_level` applies to this crate and
/// the client library.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,status_monitor={level},status_events={level},stompsockets={level}",
            level = log_level.to_lowercase()
        ))
    });

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
