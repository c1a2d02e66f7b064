//! # packet-relay
//!
//! A multi-source packet relay: independent producer threads chunk input
//! streams into tagged packets, multiplex them through one bounded
//! in-memory ring buffer, and a fixed pool of consumer threads drains,
//! filters, and appends accepted payloads to per-destination files. The
//! ring's fixed capacity is the only buffering between sources and sinks,
//! so memory use is bounded no matter how fast sources feed.
//!
//! ## Crate structure
//!
//! - **`ring`**: the core concurrent framed circular buffer, with
//!   capacity accounting over a reserved slack byte, split-aware copies
//!   across the wrap boundary, and condvar-based blocking pops.
//! - **`frame`**: the packet codec layered on a ring frame
//!   (`origin | destination | sequence | bytes`, native-endian words).
//! - **`source`** / **`sink`** / **`filter`**: the replaceable I/O policy
//!   seams, with file-backed, directory-backed, and drop-rule defaults.
//! - **`backoff`**: injectable retry delay policies for producers blocked
//!   on a full ring.
//! - **`producer`** / **`consumer`**: the thread agents on either side of
//!   the ring.
//! - **`daemon`**: the orchestrator owning thread and buffer lifecycle for
//!   one fixed-duration run.
//! - **`config`**: figment-based typed configuration with semantic
//!   validation.
//! - **`error`**: the crate error type; **`logging`**: tracing setup for
//!   the binary.

pub mod backoff;
pub mod config;
pub mod consumer;
pub mod daemon;
pub mod error;
pub mod filter;
pub mod frame;
pub mod logging;
pub mod producer;
pub mod ring;
pub mod sink;
pub mod source;

pub use config::RelayConfig;
pub use daemon::{RelayDaemon, RunSummary};
pub use error::{RelayError, RelayResult};
pub use ring::FrameRing;
