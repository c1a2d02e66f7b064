//! Downstream sinks that persist accepted payloads.
//!
//! The contract is "append these bytes for destination D", with appends to
//! the same destination never interleaving. Serialization is per
//! destination, not global: two workers delivering to different
//! destinations do not contend. Sink locks are acquired only after a frame
//! has been fully decoded, never while the ring's mutex is held.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

/// Destination-keyed append sink fed by the consumer pool.
pub trait PacketSink: Send + Sync {
    /// Append `bytes` to destination `destination`.
    fn append(&self, destination: usize, bytes: &[u8]) -> io::Result<()>;
}

/// One append-mode file per destination under a common directory.
///
/// Files are named `<destination>.txt` and created lazily on first append.
/// The registry of open files sits behind an `RwLock`; each file has its
/// own mutex, so concurrent appends to distinct destinations proceed in
/// parallel while appends to one destination stay whole.
pub struct DirectorySink {
    dir: PathBuf,
    files: RwLock<HashMap<usize, Arc<Mutex<File>>>>,
}

impl DirectorySink {
    /// Use `dir` as the output directory, creating it if absent.
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: RwLock::new(HashMap::new()),
        })
    }

    /// Path of the file backing `destination`.
    pub fn path_for(&self, destination: usize) -> PathBuf {
        self.dir.join(format!("{destination}.txt"))
    }

    fn file_for(&self, destination: usize) -> io::Result<Arc<Mutex<File>>> {
        if let Some(file) = self.files.read().get(&destination) {
            return Ok(Arc::clone(file));
        }

        let mut files = self.files.write();
        // Lost the race: another worker may have opened it meanwhile.
        if let Some(file) = files.get(&destination) {
            return Ok(Arc::clone(file));
        }

        let path = self.path_for(destination);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(destination, path = %path.display(), "opened sink file");
        let file = Arc::new(Mutex::new(file));
        files.insert(destination, Arc::clone(&file));
        Ok(file)
    }
}

impl PacketSink for DirectorySink {
    fn append(&self, destination: usize, bytes: &[u8]) -> io::Result<()> {
        let file = self.file_for(destination)?;
        let mut guard = file.lock();
        guard.write_all(bytes)
    }
}

/// In-memory sink collecting appends per destination, for tests.
pub struct MemorySink {
    chunks: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
}

impl MemorySink {
    /// Empty sink with no destinations yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunks: Mutex::new(HashMap::new()),
        }
    }

    /// All chunks appended for `destination`, in arrival order.
    pub fn chunks_for(&self, destination: usize) -> Vec<Vec<u8>> {
        self.chunks
            .lock()
            .get(&destination)
            .cloned()
            .unwrap_or_default()
    }

    /// Destinations that received at least one append.
    pub fn destinations(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.chunks.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketSink for MemorySink {
    fn append(&self, destination: usize, bytes: &[u8]) -> io::Result<()> {
        self.chunks
            .lock()
            .entry(destination)
            .or_default()
            .push(bytes.to_vec());
        Ok(())
    }
}
