//! Status Monitor - Main Library
//!
//! Binary-side plumbing for the real-time status event client.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, config,
//!   logging, shutdown)
//! - **stompsockets**: Event client library (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use status_monitor::bin_common::{load_config_from_env, ConfigType, EventsConfig};
//! ```

// Re-export workspace libraries for convenience
pub use stompsockets;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod config;
    pub mod logging;
    pub mod shutdown;

    pub use cli::{load_config_from_env, ConfigType};
    pub use config::{ConfigError, EventsConfig, ReconnectConfig};
    pub use logging::init_tracing;
    pub use shutdown::ShutdownManager;
}
