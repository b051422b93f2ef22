//! Logging initialization.
//!
//! The engine itself only emits `tracing` events; installing a subscriber
//! is the embedder's choice. These helpers cover the common cases so a
//! daemon embedding the engine does not have to repeat them.

use tracing_subscriber::EnvFilter;

/// Install a plain-text subscriber filtered by `RUST_LOG`, defaulting to
/// `virtnode=info`. Does nothing if a subscriber is already installed.
pub fn init_from_env() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("virtnode=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Install a JSON subscriber for log-collector environments. Does nothing
/// if a subscriber is already installed.
pub fn init_json() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("virtnode=info"));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(false)
        .try_init();
}
