//! Upstream data sources consumed by producer agents.
//!
//! A source is just "read the next chunk, up to N bytes, or report
//! end-of-stream". The shipped [`FileSource`] models network traffic with
//! files: each file stands in for a client streaming packets at one origin,
//! and the producer thread slices it into chunk-sized reads.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

/// A sequential byte stream feeding one producer agent.
pub trait ChunkSource: Send {
    /// Read up to `max_len` bytes. Returns `Ok(None)` at end-of-stream.
    ///
    /// A short read is not end-of-stream; only `None` is. Errors are fatal
    /// to the owning producer.
    fn next_chunk(&mut self, max_len: usize) -> io::Result<Option<Vec<u8>>>;
}

/// File-backed source: buffered chunk reads until EOF.
pub struct FileSource {
    path: PathBuf,
    reader: BufReader<File>,
}

impl FileSource {
    /// Open the backing file. Failure here is the producer's one fatal
    /// startup error.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        debug!(path = %path.display(), "opened source file");
        Ok(Self {
            path,
            reader: BufReader::new(file),
        })
    }

    /// Path of the backing file, for logging.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChunkSource for FileSource {
    fn next_chunk(&mut self, max_len: usize) -> io::Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; max_len];
        let n = self.reader.read(&mut chunk)?;
        if n == 0 {
            debug!(path = %self.path.display(), "source exhausted");
            return Ok(None);
        }
        chunk.truncate(n);
        Ok(Some(chunk))
    }
}

/// In-memory source for tests and benchmarks.
pub struct MemorySource {
    data: Vec<u8>,
    pos: usize,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }
}

impl ChunkSource for MemorySource {
    fn next_chunk(&mut self, max_len: usize) -> io::Result<Option<Vec<u8>>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let end = (self.pos + max_len).min(self.data.len());
        let chunk = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(Some(chunk))
    }
}
