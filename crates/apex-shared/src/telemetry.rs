//! Tracing/log initialization shared by every binary in the workspace.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize a global `tracing` subscriber reading `RUST_LOG`
/// (default `info`), emitting either human-readable or JSON lines.
///
/// Safe to call more than once per process (e.g. in tests); subsequent
/// calls are no-ops.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
    };

    // A `Err` here just means a subscriber was already installed
    // (common in tests); that is not a failure condition.
    let _ = result;
}
