//! Producer agents: one thread per input source.
//!
//! A producer chunks its source stream, tags each chunk with
//! `(origin, destination, sequence)`, and pushes the encoded packet into
//! the shared ring. A full ring is never an error: the agent backs off
//! with its injected [`BackoffPolicy`] and retries until the push lands.
//! Between chunks it sleeps a small randomized interval, modeling the
//! variable arrival timing of network traffic. The only terminal
//! conditions are source exhaustion (normal exit) and source I/O failure
//! or a permanently oversized frame (fatal to this agent alone).

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tracing::{debug, info, trace};

use crate::backoff::BackoffPolicy;
use crate::error::{RelayError, RelayResult};
use crate::frame::Packet;
use crate::ring::{FrameRing, PushError};
use crate::source::ChunkSource;

/// Read-only parameters for one producer agent, fixed before its thread
/// starts.
#[derive(Debug, Clone)]
pub struct ProducerContext {
    /// Origin identifier stamped on every packet.
    pub origin: usize,
    /// Destination identifier stamped on every packet.
    pub destination: usize,
    /// Maximum raw bytes per chunk.
    pub chunk_size: usize,
    /// Delay schedule between push retries.
    pub backoff: BackoffPolicy,
    /// Upper bound of the random pause between chunk fetches; zero
    /// disables the pause (used by throughput tests).
    pub arrival_jitter: Duration,
}

/// Counters reported by a producer when its thread exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProducerStats {
    /// Frames successfully pushed into the ring.
    pub frames_pushed: usize,
    /// Total push retries caused by a full ring.
    pub retries: usize,
}

/// Drive one source to exhaustion, pushing every chunk into `ring`.
///
/// Runs on the producer's own thread; blocking is by sleep only, never by
/// holding a lock. Returns the agent's counters, or the error that ended
/// it early.
pub fn run_producer(
    ring: &Arc<FrameRing>,
    ctx: &ProducerContext,
    source: &mut dyn ChunkSource,
) -> RelayResult<ProducerStats> {
    let mut stats = ProducerStats::default();
    let mut sequence = 0usize;
    let mut wire = Vec::new();

    debug!(
        origin = ctx.origin,
        destination = ctx.destination,
        "producer started"
    );

    loop {
        let chunk = source
            .next_chunk(ctx.chunk_size)
            .map_err(|err| RelayError::SourceFailed {
                origin: ctx.origin,
                reason: err.to_string(),
            })?;
        let Some(chunk) = chunk else {
            break;
        };

        let packet = Packet {
            origin: ctx.origin,
            destination: ctx.destination,
            sequence,
            payload: Bytes::from(chunk),
        };
        packet.encode_into(&mut wire);

        let mut attempt = 0u32;
        loop {
            match ring.try_push(&wire) {
                Ok(()) => break,
                Err(PushError::Full) => {
                    trace!(origin = ctx.origin, attempt, "ring full, backing off");
                    stats.retries += 1;
                    thread::sleep(ctx.backoff.delay(attempt));
                    attempt = attempt.saturating_add(1);
                }
                Err(err @ PushError::TooLarge { .. }) => {
                    return Err(RelayError::FrameTooLarge {
                        origin: ctx.origin,
                        detail: err.to_string(),
                    });
                }
            }
        }

        stats.frames_pushed += 1;
        sequence += 1;

        if ctx.arrival_jitter >= Duration::from_micros(1) {
            let pause = rand::thread_rng()
                .gen_range(Duration::from_micros(1)..=ctx.arrival_jitter);
            thread::sleep(pause);
        }
    }

    info!(
        origin = ctx.origin,
        frames = stats.frames_pushed,
        retries = stats.retries,
        "producer finished, source exhausted"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::PopError;
    use crate::source::MemorySource;

    fn context(origin: usize, destination: usize) -> ProducerContext {
        ProducerContext {
            origin,
            destination,
            chunk_size: 16,
            backoff: BackoffPolicy::Fixed {
                delay: Duration::from_micros(10),
            },
            arrival_jitter: Duration::ZERO,
        }
    }

    #[test]
    fn pushes_all_chunks_in_sequence_order() {
        let ring = Arc::new(FrameRing::new(4096));
        let mut source = MemorySource::new(vec![9u8; 100]);

        let stats = run_producer(&ring, &context(1, 2), &mut source).unwrap();
        assert_eq!(stats.frames_pushed, 7); // 6 full chunks + 4-byte tail
        assert_eq!(stats.retries, 0);

        let mut out = vec![0u8; 128];
        for expected_seq in 0..7 {
            let n = ring.try_pop(&mut out).unwrap();
            let packet = Packet::decode(&out[..n]).unwrap();
            assert_eq!(packet.origin, 1);
            assert_eq!(packet.destination, 2);
            assert_eq!(packet.sequence, expected_seq);
        }
        assert_eq!(ring.try_pop(&mut out), Err(PopError::Empty));
    }

    #[test]
    fn retries_until_ring_drains() {
        // Arena fits roughly one frame, so the producer must block on the
        // consumer thread draining it.
        let ring = Arc::new(FrameRing::new(64));
        let mut source = MemorySource::new(vec![3u8; 64]);

        let drainer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut out = vec![0u8; 64];
                let mut popped = 0;
                while popped < 4 {
                    // Drain slowly so the producer reliably sees Full.
                    thread::sleep(Duration::from_millis(20));
                    match ring.pop_wait(&mut out, Duration::from_millis(50)) {
                        Ok(_) => popped += 1,
                        Err(PopError::Empty) => {}
                        Err(e) => panic!("unexpected: {e}"),
                    }
                }
            })
        };

        let stats = run_producer(&ring, &context(1, 2), &mut source).unwrap();
        drainer.join().unwrap();

        assert_eq!(stats.frames_pushed, 4); // 64 bytes in 16-byte chunks
        assert!(stats.retries > 0, "expected backpressure retries");
    }

    #[test]
    fn oversized_chunk_is_fatal_not_retried() {
        // A context with a chunk size the arena cannot hold; bypasses the
        // config validator on purpose.
        let ring = Arc::new(FrameRing::new(64));
        let mut ctx = context(5, 6);
        ctx.chunk_size = 256;
        let mut source = MemorySource::new(vec![1u8; 256]);

        let err = run_producer(&ring, &ctx, &mut source).unwrap_err();
        match err {
            RelayError::FrameTooLarge { origin, .. } => assert_eq!(origin, 5),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_source_pushes_nothing() {
        let ring = Arc::new(FrameRing::new(256));
        let mut source = MemorySource::new(Vec::new());
        let stats = run_producer(&ring, &context(1, 2), &mut source).unwrap();
        assert_eq!(stats.frames_pushed, 0);
        assert!(ring.is_empty());
    }
}
