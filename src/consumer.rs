//! Consumer pool: fixed worker threads draining the shared ring.
//!
//! Each worker loops: check the cancellation flag, pop one frame (blocking
//! on the ring's condition variable up to the poll interval), decode it,
//! run the filter policy, and hand accepted payloads to the sink. The
//! cancellation flag is checked only at loop top, never while the arena
//! mutex or a sink lock is held, so a request is observed within one poll
//! interval and no operation is interrupted mid-flight. Frames left in the
//! ring at cancellation are deliberately abandoned; shutdown is
//! best-effort by design.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use crate::filter::FilterPolicy;
use crate::frame::Packet;
use crate::ring::{FrameRing, PopError};
use crate::sink::PacketSink;

/// Counters reported by one worker at exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerStats {
    /// Packets accepted by the filter and appended to the sink.
    pub delivered: usize,
    /// Packets rejected by the filter.
    pub filtered: usize,
    /// Frames too short to carry a packet header; dropped.
    pub malformed: usize,
    /// Sink append failures; the payload is lost, the worker continues.
    pub sink_errors: usize,
}

impl WorkerStats {
    fn merge(&mut self, other: &WorkerStats) {
        self.delivered += other.delivered;
        self.filtered += other.filtered;
        self.malformed += other.malformed;
        self.sink_errors += other.sink_errors;
    }
}

/// Handle over the running worker threads.
///
/// Created by [`ConsumerPool::spawn`]; the owner requests cancellation and
/// then joins. Dropping the pool without joining detaches the workers, so
/// the orchestrator always joins explicitly.
pub struct ConsumerPool {
    cancel: Arc<AtomicBool>,
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl ConsumerPool {
    /// Start `workers` threads sharing one ring, filter, and sink.
    ///
    /// `scratch_len` sizes each worker's decode buffer and must cover the
    /// largest frame payload producers generate
    /// (`RelayConfig::max_frame_payload`); a worker that still meets a
    /// larger frame grows its buffer and retries rather than losing the
    /// frame.
    pub fn spawn(
        workers: usize,
        ring: Arc<FrameRing>,
        filter: Arc<dyn FilterPolicy>,
        sink: Arc<dyn PacketSink>,
        poll_interval: Duration,
        scratch_len: usize,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let handles = (0..workers)
            .map(|worker| {
                let ring = Arc::clone(&ring);
                let filter = Arc::clone(&filter);
                let sink = Arc::clone(&sink);
                let cancel = Arc::clone(&cancel);
                thread::spawn(move || {
                    worker_loop(worker, &ring, &*filter, &*sink, &cancel, poll_interval, scratch_len)
                })
            })
            .collect();

        Self { cancel, handles }
    }

    /// Request cooperative cancellation of every worker.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Wait for all workers to exit and return their merged counters.
    pub fn join(self) -> WorkerStats {
        let mut total = WorkerStats::default();
        for handle in self.handles {
            match handle.join() {
                Ok(stats) => total.merge(&stats),
                Err(_) => error!("consumer worker panicked"),
            }
        }
        total
    }
}

fn worker_loop(
    worker: usize,
    ring: &FrameRing,
    filter: &dyn FilterPolicy,
    sink: &dyn PacketSink,
    cancel: &AtomicBool,
    poll_interval: Duration,
    scratch_len: usize,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let mut scratch = vec![0u8; scratch_len];
    debug!(worker, "consumer worker started");

    while !cancel.load(Ordering::SeqCst) {
        match ring.pop_wait(&mut scratch, poll_interval) {
            Ok(n) => process_frame(worker, &scratch[..n], filter, sink, &mut stats),
            Err(PopError::Empty) => {
                // Timed out; loop around and re-check the cancel flag.
            }
            Err(PopError::OutputTooSmall { needed }) => {
                // The frame stayed in the ring; grow and fetch it next
                // iteration. Producers sized by config never trigger this.
                warn!(worker, needed, "frame exceeds scratch buffer, growing");
                scratch.resize(needed, 0);
            }
        }
    }

    debug!(
        worker,
        delivered = stats.delivered,
        filtered = stats.filtered,
        "consumer worker cancelled"
    );
    stats
}

fn process_frame(
    worker: usize,
    frame: &[u8],
    filter: &dyn FilterPolicy,
    sink: &dyn PacketSink,
    stats: &mut WorkerStats,
) {
    let packet = match Packet::decode(frame) {
        Ok(packet) => packet,
        Err(err) => {
            warn!(worker, %err, "dropping malformed frame");
            stats.malformed += 1;
            return;
        }
    };

    trace!(
        worker,
        origin = packet.origin,
        destination = packet.destination,
        sequence = packet.sequence,
        len = packet.payload.len(),
        "processing packet"
    );

    if !filter.accept(packet.origin, packet.destination, &packet.payload) {
        stats.filtered += 1;
        return;
    }

    match sink.append(packet.destination, &packet.payload) {
        Ok(()) => stats.delivered += 1,
        Err(err) => {
            warn!(
                worker,
                destination = packet.destination,
                %err,
                "sink append failed, payload dropped"
            );
            stats.sink_errors += 1;
        }
    }
}
