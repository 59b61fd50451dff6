//! Logging and tracing utilities for the provider.
//!
//! This module provides helpers for setting up structured logging using the
//! `tracing` ecosystem. All logs are written to **stderr**; stdout belongs to the
//! host protocol.
//!
//! # Quick Start
//!
//! ```no_run
//! use command_provider::init_logging;
//!
//! init_logging();
//! tracing::info!("Provider starting");
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `debug`, `command_provider=debug`)
//!
//! ```bash
//! # Show each command the provider runs
//! RUST_LOG=command_provider=debug ./provider
//!
//! # Only warnings and errors
//! RUST_LOG=warn ./provider
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Build the subscriber shared by every initializer.
///
/// `RUST_LOG` wins over `default_level` when it is set and valid.
fn subscriber(default_level: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Initialize the default logging subscriber.
///
/// This sets up a `tracing` subscriber that:
/// - Writes to **stderr**
/// - Respects the `RUST_LOG` environment variable for filtering
/// - Defaults to `info` level if `RUST_LOG` is not set
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    subscriber("info").init();
}

/// Initialize logging with a custom default level.
///
/// Like [`init_logging`], but `default_level` (e.g. `"debug"`) is used when
/// `RUST_LOG` is not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Try to initialize logging, returning false if already initialized.
///
/// Unlike [`init_logging`], this function does not panic if a subscriber
/// has already been set, which makes it safe to call from tests.
pub fn try_init_logging() -> bool {
    subscriber("info").try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("debug").is_ok());
        assert!(EnvFilter::try_new("command_provider=debug").is_ok());
        assert!(EnvFilter::try_new("warn,command_provider::exec=trace").is_ok());
    }

    #[test]
    fn test_try_init_logging_only_once() {
        // The first call may lose a race with another test; the second never wins.
        let _ = try_init_logging();
        assert!(!try_init_logging());
    }
}
