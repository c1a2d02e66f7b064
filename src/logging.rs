//! Tracing setup for the relay binary.
//!
//! Structured logging via `tracing` with environment-based filtering:
//! `RUST_LOG` wins when set, otherwise the configured level applies to the
//! whole crate. Thread names are included because nearly everything
//! interesting here happens off the main thread.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Call once, from `main`.
///
/// `default_level` is used when `RUST_LOG` is absent; it has already been
/// validated by the configuration layer.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(false)
        .init();
}
