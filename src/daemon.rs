//! Orchestrator for one fixed-duration relay run.
//!
//! Owns the lifecycle of every thread and of the ring itself: validate all
//! producer descriptors, build the arena, start producers and the consumer
//! pool, let the pipeline run for the configured window, request consumer
//! cancellation, join producers (they end naturally on source exhaustion),
//! join consumers, drop the arena. A producer that dies on a contract
//! violation is still joined like any other and reported in the summary;
//! it never deadlocks or aborts the rest of the run.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{error, info, warn};

use crate::config::RelayConfig;
use crate::consumer::ConsumerPool;
use crate::error::{RelayError, RelayResult};
use crate::filter::{DropRules, FilterPolicy};
use crate::producer::{run_producer, ProducerContext, ProducerStats};
use crate::ring::FrameRing;
use crate::sink::{DirectorySink, PacketSink};
use crate::source::{ChunkSource, FileSource};

/// One validated producer input: identity plus a deferred source open.
///
/// The open runs on the producer's own thread so that an unopenable
/// source kills only that producer, matching the per-thread failure
/// taxonomy.
pub struct ProducerInput {
    /// Origin identifier for every packet of this producer.
    pub origin: usize,
    /// Destination identifier for every packet of this producer.
    pub destination: usize,
    /// Deferred constructor for the source stream.
    pub open: Box<dyn FnOnce() -> io::Result<Box<dyn ChunkSource>> + Send>,
}

/// Aggregate counters for a completed run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Frames pushed into the ring across all producers.
    pub frames_produced: usize,
    /// Push retries across all producers (backpressure pressure gauge).
    pub push_retries: usize,
    /// Payloads accepted and appended to the sink.
    pub frames_delivered: usize,
    /// Payloads rejected by the filter policy.
    pub frames_filtered: usize,
    /// Frames dropped as malformed plus sink append failures.
    pub frames_dropped: usize,
    /// Errors that terminated individual producers early.
    pub producer_errors: Vec<RelayError>,
}

/// The relay orchestrator.
pub struct RelayDaemon {
    config: RelayConfig,
}

impl RelayDaemon {
    /// Wrap a validated configuration.
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run the pipeline described by the configuration: file sources, the
    /// stock drop rules, and a per-destination directory sink.
    pub fn run(&self) -> RelayResult<RunSummary> {
        let sink: Arc<dyn PacketSink> =
            Arc::new(DirectorySink::new(&self.config.sink.output_dir)?);
        let inputs = self
            .config
            .sources
            .iter()
            .map(|source| {
                let path = source.path.clone();
                ProducerInput {
                    origin: source.origin,
                    destination: source.destination,
                    open: Box::new(move || {
                        FileSource::open(path).map(|s| Box::new(s) as Box<dyn ChunkSource>)
                    }),
                }
            })
            .collect();
        self.run_with(inputs, Arc::new(DropRules), sink)
    }

    /// Run with injected sources, filter, and sink.
    ///
    /// This is the full orchestration path; [`RelayDaemon::run`] is a thin
    /// wrapper. Tests inject in-memory sources and sinks here.
    pub fn run_with(
        &self,
        inputs: Vec<ProducerInput>,
        filter: Arc<dyn FilterPolicy>,
        sink: Arc<dyn PacketSink>,
    ) -> RelayResult<RunSummary> {
        // Reject bad descriptors before anything is spawned.
        let (min, max) = (self.config.producers.min_id, self.config.producers.max_id);
        for input in &inputs {
            if input.origin < min
                || input.origin > max
                || input.destination < min
                || input.destination > max
            {
                return Err(RelayError::InvalidDescriptor {
                    origin: input.origin,
                    destination: input.destination,
                    min,
                    max,
                });
            }
        }

        let ring = Arc::new(FrameRing::new(self.config.buffer.capacity_bytes));
        info!(
            capacity = self.config.buffer.capacity_bytes,
            producers = inputs.len(),
            workers = self.config.consumers.workers,
            "starting relay run"
        );
        let started = Instant::now();

        let producer_handles: Vec<JoinHandle<RelayResult<ProducerStats>>> = inputs
            .into_iter()
            .map(|input| {
                let ring = Arc::clone(&ring);
                let ctx = ProducerContext {
                    origin: input.origin,
                    destination: input.destination,
                    chunk_size: self.config.producers.chunk_size,
                    backoff: self.config.producers.backoff.clone(),
                    arrival_jitter: self.config.producers.arrival_jitter,
                };
                thread::spawn(move || {
                    let mut source = (input.open)().map_err(|err| RelayError::SourceFailed {
                        origin: ctx.origin,
                        reason: err.to_string(),
                    })?;
                    run_producer(&ring, &ctx, source.as_mut())
                })
            })
            .collect();

        let pool = ConsumerPool::spawn(
            self.config.consumers.workers,
            Arc::clone(&ring),
            filter,
            sink,
            self.config.consumers.poll_interval,
            self.config.max_frame_payload(),
        );

        // The bounded run window.
        thread::sleep(self.config.run.duration);
        pool.cancel();

        let mut summary = RunSummary::default();
        for handle in producer_handles {
            match handle.join() {
                Ok(Ok(stats)) => {
                    summary.frames_produced += stats.frames_pushed;
                    summary.push_retries += stats.retries;
                }
                Ok(Err(err)) => {
                    warn!(%err, "producer terminated early");
                    summary.producer_errors.push(err);
                }
                Err(_) => error!("producer thread panicked"),
            }
        }

        let worker_stats = pool.join();
        summary.frames_delivered = worker_stats.delivered;
        summary.frames_filtered = worker_stats.filtered;
        summary.frames_dropped = worker_stats.malformed + worker_stats.sink_errors;

        let leftover = ring.occupied();
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            produced = summary.frames_produced,
            delivered = summary.frames_delivered,
            filtered = summary.frames_filtered,
            leftover_bytes = leftover,
            "relay run complete"
        );

        // `ring` drops here, after every borrower has been joined.
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::AcceptAll;
    use crate::sink::MemorySink;
    use crate::source::MemorySource;
    use std::time::Duration;

    fn quick_config() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.buffer.capacity_bytes = 512;
        config.producers.chunk_size = 32;
        config.producers.arrival_jitter = Duration::ZERO;
        config.consumers.workers = 2;
        config.consumers.poll_interval = Duration::from_millis(5);
        config.run.duration = Duration::from_millis(200);
        config
    }

    fn memory_input(origin: usize, destination: usize, data: Vec<u8>) -> ProducerInput {
        ProducerInput {
            origin,
            destination,
            open: Box::new(move || Ok(Box::new(MemorySource::new(data)) as Box<dyn ChunkSource>)),
        }
    }

    #[test]
    fn rejects_out_of_range_descriptor_before_spawning() {
        let daemon = RelayDaemon::new(quick_config()).unwrap();
        let err = daemon
            .run_with(
                vec![memory_input(3, 10_000, vec![1, 2, 3])],
                Arc::new(AcceptAll),
                Arc::new(MemorySink::new()),
            )
            .unwrap_err();

        match err {
            RelayError::InvalidDescriptor {
                destination, max, ..
            } => {
                assert_eq!(destination, 10_000);
                assert_eq!(max, 255);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn relays_all_data_end_to_end() {
        let daemon = RelayDaemon::new(quick_config()).unwrap();
        let sink = Arc::new(MemorySink::new());

        let summary = daemon
            .run_with(
                vec![
                    memory_input(1, 2, vec![b'a'; 100]),
                    memory_input(3, 4, vec![b'b'; 100]),
                ],
                Arc::new(AcceptAll),
                Arc::clone(&sink) as Arc<dyn PacketSink>,
            )
            .unwrap();

        assert!(summary.producer_errors.is_empty());
        assert_eq!(summary.frames_produced, 8); // 100/32 -> 4 frames each
        assert_eq!(summary.frames_delivered, 8);

        let dest2: usize = sink.chunks_for(2).iter().map(Vec::len).sum();
        let dest4: usize = sink.chunks_for(4).iter().map(Vec::len).sum();
        assert_eq!(dest2, 100);
        assert_eq!(dest4, 100);
    }

    #[test]
    fn unopenable_source_fails_alone() {
        let daemon = RelayDaemon::new(quick_config()).unwrap();
        let sink = Arc::new(MemorySink::new());

        let broken = ProducerInput {
            origin: 9,
            destination: 10,
            open: Box::new(|| {
                Err(io::Error::new(io::ErrorKind::NotFound, "no such stream"))
            }),
        };

        let summary = daemon
            .run_with(
                vec![broken, memory_input(1, 2, vec![b'z'; 64])],
                Arc::new(AcceptAll),
                Arc::clone(&sink) as Arc<dyn PacketSink>,
            )
            .unwrap();

        assert_eq!(summary.producer_errors.len(), 1);
        assert!(matches!(
            summary.producer_errors[0],
            RelayError::SourceFailed { origin: 9, .. }
        ));
        // The healthy producer still delivered everything.
        let dest2: usize = sink.chunks_for(2).iter().map(Vec::len).sum();
        assert_eq!(dest2, 64);
    }
}
