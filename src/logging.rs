//! Log subscriber setup for the binary
//!
//! Logs go to stderr; stdout carries only the wallet report.

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Output is human
/// readable on a terminal and JSON otherwise.
pub fn setup_logging() {
    let is_terminal = std::io::stderr().is_terminal();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if is_terminal {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(true)
            .init();
    }

    tracing::debug!(rust_log = ?std::env::var("RUST_LOG").ok(), "Logging initialized");
}
