//! Custom error types for the relay.
//!
//! `RelayError` is the library-wide error enum, built with `thiserror`.
//! Capacity conditions (`Full`, `Empty`) are deliberately NOT here: they
//! are expected backpressure signals modeled as small status enums on the
//! ring API (`ring::PushError`, `ring::PopError`) and resolved locally by
//! the calling agent or worker. What lands in `RelayError` is the fatal
//! taxonomy: configuration problems, contract violations caught at
//! startup, and I/O failures that end a component.

use thiserror::Error;

/// Convenience alias for results using the relay error type.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Fatal errors surfaced by the relay library.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("configuration validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A producer descriptor carries an identifier outside the configured
    /// valid range. Raised before any thread is spawned.
    #[error("producer {origin} -> {destination}: identifier outside valid range [{min}, {max}]")]
    InvalidDescriptor {
        origin: usize,
        destination: usize,
        min: usize,
        max: usize,
    },

    /// A producer's source failed mid-stream; fatal to that producer only.
    #[error("source failure for origin {origin}: {reason}")]
    SourceFailed { origin: usize, reason: String },

    /// A producer built a frame that can never fit the arena. Caught by
    /// config validation normally; this covers callers that bypass it.
    #[error("origin {origin} produced an oversized frame: {detail}")]
    FrameTooLarge { origin: usize, detail: String },
}

impl From<figment::Error> for RelayError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
