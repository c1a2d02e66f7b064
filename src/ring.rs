//! Bounded framed ring buffer shared by all producer and consumer threads.
//!
//! This module implements the central multiplexing point of the relay: a
//! fixed-capacity circular byte arena storing variable-length,
//! length-prefixed frames. Many producers push concurrently, many consumers
//! pop concurrently, and a frame is only ever observed whole.
//!
//! # Memory layout
//!
//! ```text
//! [ data region: capacity bytes, logically circular ]
//!    ^ read             ^ write
//!
//! Frame on the wire: [length: usize, native-endian][payload: length bytes]
//! ```
//!
//! Both the length prefix and the payload may straddle the wrap boundary;
//! `copy_in`/`copy_out` decompose any transfer into at most two contiguous
//! segments so the callers never branch on wraparound themselves.
//!
//! # Capacity accounting
//!
//! One byte of the arena is permanently reserved (the slack byte). With at
//! most `capacity - 1` usable bytes, `read == write` always means empty and
//! a full arena never aliases the empty state, so no separate occupancy
//! counter is needed.
//!
//! # Thread safety
//!
//! A single `parking_lot::Mutex` guards the cursors and the region
//! contents; it is held across an entire push or pop, which is what makes
//! partial frames unobservable. The critical section is memcpy-bounded and
//! contains no I/O. A condition variable is notified after every successful
//! push and pop; `pop_wait` uses it for a timed block instead of sleep
//! polling.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Size in bytes of the native machine word used for the length prefix.
pub const WORD: usize = std::mem::size_of::<usize>();

/// Backpressure statuses for [`FrameRing::try_push`].
///
/// `Full` is an expected, frequent condition that drives the caller's
/// retry/backoff policy. `TooLarge` is permanent for the given payload and
/// must not be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    /// Not enough free space right now; retry after consumers drain.
    #[error("ring buffer full")]
    Full,

    /// The framed payload can never fit, even into an empty arena.
    #[error("frame of {frame_len} bytes exceeds usable capacity {usable}")]
    TooLarge {
        /// Prefix plus payload length.
        frame_len: usize,
        /// Usable arena capacity (`capacity - 1`).
        usable: usize,
    },
}

/// Statuses for [`FrameRing::try_pop`] and [`FrameRing::pop_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PopError {
    /// No complete frame available right now.
    #[error("ring buffer empty")]
    Empty,

    /// The caller's buffer cannot hold the next frame. The frame stays in
    /// the arena untouched; retry with at least `needed` bytes.
    #[error("output buffer too small: next frame is {needed} bytes")]
    OutputTooSmall {
        /// Payload length of the frame at the read cursor.
        needed: usize,
    },
}

/// Cursors plus backing storage, all guarded by one mutex.
struct RingState {
    /// Circular data region. Length is the ring's capacity and never
    /// changes after construction.
    buf: Box<[u8]>,

    /// Offset of the next unread byte. Always in `[0, capacity)`.
    read: usize,

    /// Offset of the next free byte. Always in `[0, capacity)`.
    write: usize,
}

impl RingState {
    fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently occupied by unread frames.
    fn occupied(&self) -> usize {
        if self.write >= self.read {
            self.write - self.read
        } else {
            self.capacity() - self.read + self.write
        }
    }

    /// Free bytes available for writing, with the slack byte already
    /// subtracted.
    fn free(&self) -> usize {
        self.capacity() - 1 - self.occupied()
    }

    /// Copy `src` into the arena starting at `offset`, splitting at the
    /// wrap boundary when needed. Returns the advanced (normalized) offset.
    fn copy_in(&mut self, offset: usize, src: &[u8]) -> usize {
        let cap = self.capacity();
        let first = src.len().min(cap - offset);
        self.buf[offset..offset + first].copy_from_slice(&src[..first]);
        if first < src.len() {
            let rest = src.len() - first;
            self.buf[..rest].copy_from_slice(&src[first..]);
            rest
        } else {
            let next = offset + first;
            if next == cap {
                0
            } else {
                next
            }
        }
    }

    /// Copy `out.len()` bytes out of the arena starting at `offset`,
    /// split-aware. Returns the advanced (normalized) offset.
    fn copy_out(&self, offset: usize, out: &mut [u8]) -> usize {
        let cap = self.capacity();
        let first = out.len().min(cap - offset);
        out[..first].copy_from_slice(&self.buf[offset..offset + first]);
        if first < out.len() {
            let rest = out.len() - first;
            out[first..].copy_from_slice(&self.buf[..rest]);
            rest
        } else {
            let next = offset + first;
            if next == cap {
                0
            } else {
                next
            }
        }
    }

    /// Decode the length prefix at the read cursor without advancing it.
    fn peek_len(&self) -> usize {
        let mut prefix = [0u8; WORD];
        self.copy_out(self.read, &mut prefix);
        usize::from_ne_bytes(prefix)
    }
}

/// Fixed-capacity ring buffer of length-prefixed frames, safe for any
/// number of concurrent producers and consumers.
///
/// Construction allocates the arena and the synchronization primitives;
/// dropping the ring releases them. Threads share the ring through
/// `Arc<FrameRing>` handles injected at spawn time.
pub struct FrameRing {
    state: Mutex<RingState>,
    /// Notified after every successful push and pop.
    activity: Condvar,
}

impl FrameRing {
    /// Create a ring with a data region of `capacity` bytes.
    ///
    /// Usable capacity is `capacity - 1` because of the slack byte. The
    /// capacity must leave room for at least a one-byte framed payload.
    ///
    /// # Panics
    ///
    /// Panics if `capacity <= WORD + 1`; such an arena could never hold a
    /// frame. Configuration validation rejects this long before a ring is
    /// built, so hitting the assert means a caller bypassed config.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity > WORD + 1,
            "ring capacity {capacity} cannot hold a single frame"
        );
        Self {
            state: Mutex::new(RingState {
                buf: vec![0u8; capacity].into_boxed_slice(),
                read: 0,
                write: 0,
            }),
            activity: Condvar::new(),
        }
    }

    /// Total size of the data region in bytes.
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }

    /// Bytes currently occupied by unread frames (prefixes included).
    pub fn occupied(&self) -> usize {
        self.state.lock().occupied()
    }

    /// Whether the ring holds no frames.
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.read == state.write
    }

    /// Append one framed payload, non-blocking.
    ///
    /// On success the prefix and payload are copied in under the lock and
    /// the write cursor is advanced past them. `Err(PushError::Full)` is
    /// the backpressure signal: nothing was written, and the caller decides
    /// when to retry. Zero-length payloads are valid frames; they still
    /// occupy `WORD` prefix bytes.
    pub fn try_push(&self, payload: &[u8]) -> Result<(), PushError> {
        let frame_len = WORD + payload.len();

        let mut state = self.state.lock();
        let usable = state.capacity() - 1;
        if frame_len > usable {
            return Err(PushError::TooLarge { frame_len, usable });
        }
        if frame_len > state.free() {
            return Err(PushError::Full);
        }

        let mut offset = state.write;
        offset = state.copy_in(offset, &payload.len().to_ne_bytes());
        offset = state.copy_in(offset, payload);
        state.write = offset;

        self.activity.notify_one();
        Ok(())
    }

    /// Remove the oldest frame into `out`, non-blocking.
    ///
    /// Returns the payload length on success. `Err(PopError::Empty)` when
    /// no frame is available. `Err(PopError::OutputTooSmall)` when `out`
    /// cannot hold the next payload; the arena is left untouched so the
    /// same frame can be fetched again with a larger buffer.
    pub fn try_pop(&self, out: &mut [u8]) -> Result<usize, PopError> {
        let mut state = self.state.lock();
        self.pop_locked(&mut state, out)
    }

    /// Remove the oldest frame into `out`, blocking up to `timeout`.
    ///
    /// Waits on the ring's condition variable while empty, so a consumer
    /// wakes as soon as a producer pushes instead of sleeping blind.
    /// Returns `Err(PopError::Empty)` if the timeout elapses with no frame;
    /// the timed wait is what bounds how late a cancellation request can be
    /// observed by a polling worker.
    pub fn pop_wait(&self, out: &mut [u8], timeout: Duration) -> Result<usize, PopError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            match self.pop_locked(&mut state, out) {
                Err(PopError::Empty) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PopError::Empty);
                    }
                    if self
                        .activity
                        .wait_for(&mut state, deadline - now)
                        .timed_out()
                    {
                        // One last check: a push may have raced the timeout.
                        return self.pop_locked(&mut state, out);
                    }
                }
                other => return other,
            }
        }
    }

    fn pop_locked(&self, state: &mut RingState, out: &mut [u8]) -> Result<usize, PopError> {
        if state.read == state.write {
            return Err(PopError::Empty);
        }

        let payload_len = state.peek_len();
        if out.len() < payload_len {
            return Err(PopError::OutputTooSmall { needed: payload_len });
        }

        // Hop the cursor over the prefix, then copy the payload out.
        let offset = (state.read + WORD) % state.capacity();
        state.read = state.copy_out(offset, &mut out[..payload_len]);

        self.activity.notify_one();
        Ok(payload_len)
    }
}

impl std::fmt::Debug for FrameRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FrameRing")
            .field("capacity", &state.capacity())
            .field("occupied", &state.occupied())
            .field("read", &state.read)
            .field("write", &state.write)
            .finish()
    }
}
