//! Configuration system using Figment.
//!
//! Strongly-typed configuration loaded from a TOML file merged with
//! environment variables (prefixed `PACKET_RELAY_`, `__` as the section
//! separator). Parsing and semantic validation are separate steps: a
//! config that extracts cleanly can still be rejected by [`RelayConfig::
//! validate`], which checks the constraints the type system cannot.
//!
//! # Example
//! ```no_run
//! use packet_relay::config::RelayConfig;
//!
//! # fn main() -> Result<(), packet_relay::error::RelayError> {
//! let config = RelayConfig::load_from("relay.toml")?;
//! config.validate()?;
//! println!("arena: {} bytes", config.buffer.capacity_bytes);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::error::{RelayError, RelayResult};
use crate::frame::HEADER_LEN;
use crate::ring::WORD;

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Application-wide settings.
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Shared ring buffer settings.
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Producer-side settings, shared by all agents.
    #[serde(default)]
    pub producers: ProducerConfig,
    /// Consumer pool settings.
    #[serde(default)]
    pub consumers: ConsumerConfig,
    /// Sink settings.
    #[serde(default)]
    pub sink: SinkConfig,
    /// Length of the batch run.
    #[serde(default)]
    pub run: RunConfig,
    /// Input sources, one producer thread each.
    #[serde(default)]
    pub sources: Vec<SourceDefinition>,
}

/// Application-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Ring buffer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Arena capacity in bytes; one byte is reserved as slack.
    #[serde(default = "default_capacity")]
    pub capacity_bytes: usize,
}

/// Settings shared by all producer agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Maximum raw bytes per chunk read from a source.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Smallest valid origin/destination identifier.
    #[serde(default)]
    pub min_id: usize,
    /// Largest valid origin/destination identifier.
    #[serde(default = "default_max_id")]
    pub max_id: usize,
    /// Delay schedule between push retries on a full ring.
    #[serde(default)]
    pub backoff: BackoffPolicy,
    /// Upper bound of the randomized pause between chunk fetches,
    /// modeling variable arrival timing.
    #[serde(default = "default_arrival_jitter", with = "humantime_serde")]
    pub arrival_jitter: Duration,
}

/// Consumer pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Number of worker threads.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Longest a worker blocks waiting for data before re-checking the
    /// cancellation flag; also the shutdown observation bound.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

/// Sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Directory receiving one append-mode file per destination.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Batch run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// How long the orchestrator lets the pipeline run before requesting
    /// consumer cancellation.
    #[serde(default = "default_run_duration", with = "humantime_serde")]
    pub duration: Duration,
}

/// One input source: a stream identity plus its backing file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDefinition {
    /// Origin identifier tagged on every packet from this source.
    pub origin: usize,
    /// Destination identifier tagged on every packet from this source.
    pub destination: usize,
    /// Path of the file standing in for the network stream.
    pub path: PathBuf,
}

// Default value functions

fn default_log_level() -> String {
    "info".to_string()
}

fn default_capacity() -> usize {
    1024
}

fn default_chunk_size() -> usize {
    256
}

fn default_max_id() -> usize {
    255
}

fn default_arrival_jitter() -> Duration {
    Duration::from_micros(100)
}

fn default_workers() -> usize {
    4
}

fn default_poll_interval() -> Duration {
    Duration::from_micros(100)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_run_duration() -> Duration {
    Duration::from_secs(5)
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: default_capacity(),
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            min_id: 0,
            max_id: default_max_id(),
            backoff: BackoffPolicy::default(),
            arrival_jitter: default_arrival_jitter(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration: default_run_duration(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            application: ApplicationConfig::default(),
            buffer: BufferConfig::default(),
            producers: ProducerConfig::default(),
            consumers: ConsumerConfig::default(),
            sink: SinkConfig::default(),
            run: RunConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from `relay.toml` in the working directory,
    /// merged with `PACKET_RELAY_`-prefixed environment variables.
    pub fn load() -> RelayResult<Self> {
        Self::load_from("relay.toml")
    }

    /// Load configuration from a specific file path.
    ///
    /// Environment overrides use `__` between sections, for example
    /// `PACKET_RELAY_BUFFER__CAPACITY_BYTES=4096`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> RelayResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PACKET_RELAY_").split("__"))
            .extract()
            .map_err(Box::new)?;
        Ok(config)
    }

    /// Largest frame payload a producer can generate: the packet header
    /// plus one full chunk. Sizes consumer scratch buffers.
    pub fn max_frame_payload(&self) -> usize {
        HEADER_LEN + self.producers.chunk_size
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> RelayResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(RelayError::Validation(format!(
                "invalid log_level '{}', must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.producers.chunk_size == 0 {
            return Err(RelayError::Validation(
                "producers.chunk_size must be at least 1".into(),
            ));
        }

        // Largest frame: length prefix + packet header + one chunk. The
        // arena must hold it with the slack byte to spare, or producers
        // would retry a permanently unpushable frame.
        let max_frame = WORD + self.max_frame_payload();
        if self.buffer.capacity_bytes < max_frame + 1 {
            return Err(RelayError::Validation(format!(
                "buffer.capacity_bytes = {} cannot hold one maximal frame of {} bytes \
                 (need at least {})",
                self.buffer.capacity_bytes,
                max_frame,
                max_frame + 1
            )));
        }

        if self.consumers.workers == 0 {
            return Err(RelayError::Validation(
                "consumers.workers must be at least 1".into(),
            ));
        }

        if self.consumers.poll_interval.is_zero() {
            return Err(RelayError::Validation(
                "consumers.poll_interval must be nonzero".into(),
            ));
        }

        if self.producers.min_id > self.producers.max_id {
            return Err(RelayError::Validation(format!(
                "producers.min_id ({}) exceeds producers.max_id ({})",
                self.producers.min_id, self.producers.max_id
            )));
        }

        if self.run.duration.is_zero() {
            return Err(RelayError::Validation(
                "run.duration must be nonzero".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn defaults_validate() {
        RelayConfig::default().validate().unwrap();
    }

    #[test]
    fn loads_full_config_from_toml() {
        let (_dir, path) = write_config(
            r#"
            [application]
            log_level = "debug"

            [buffer]
            capacity_bytes = 4096

            [producers]
            chunk_size = 128
            min_id = 0
            max_id = 63
            arrival_jitter = "50us"

            [producers.backoff]
            policy = "fixed"
            delay = "1ms"

            [consumers]
            workers = 2
            poll_interval = "200us"

            [run]
            duration = "2s"

            [[sources]]
            origin = 1
            destination = 2
            path = "a.txt"
            "#,
        );

        let config = RelayConfig::load_from(&path).unwrap();
        config.validate().unwrap();

        assert_eq!(config.buffer.capacity_bytes, 4096);
        assert_eq!(config.producers.max_id, 63);
        assert_eq!(
            config.producers.backoff,
            BackoffPolicy::Fixed {
                delay: Duration::from_millis(1)
            }
        );
        assert_eq!(config.consumers.workers, 2);
        assert_eq!(config.run.duration, Duration::from_secs(2));
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].destination, 2);
    }

    #[test]
    fn rejects_arena_too_small_for_one_frame() {
        let (_dir, path) = write_config(
            "[buffer]\ncapacity_bytes = 64\n\n[producers]\nchunk_size = 256\n",
        );
        let config = RelayConfig::load_from(&path).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("maximal frame"));
    }

    #[test]
    fn rejects_zero_workers_and_bad_level() {
        let mut config = RelayConfig::default();
        config.consumers.workers = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.application.log_level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_id_range() {
        let mut config = RelayConfig::default();
        config.producers.min_id = 10;
        config.producers.max_id = 5;
        assert!(config.validate().is_err());
    }
}
