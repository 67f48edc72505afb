//! Artifact storage: where step outputs live and how completion is detected.
//!
//! An artifact is an opaque, name-addressed blob. Existence is the only
//! completion signal: no checksums, no versions. Stores assume a single
//! writer per artifact per process.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Name of an artifact inside a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ArtifactId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Errors raised by artifact stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("artifact not found: {0}")]
    NotFound(ArtifactId),

    #[error("location does not belong to this store: {0}")]
    UnknownLocation(String),

    #[error("i/o error on artifact {id}: {source}")]
    Io {
        id: ArtifactId,
        #[source]
        source: io::Error,
    },

    #[error("artifact store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    fn io(id: &ArtifactId, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound(id.clone())
        } else {
            StoreError::Io {
                id: id.clone(),
                source,
            }
        }
    }
}

/// A pending write. Nothing becomes visible until `commit`.
///
/// Dropping a sink without committing discards what was written.
pub trait ArtifactSink: Write {
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Name-addressed artifact registry.
///
/// `locate` and `identify` translate between ids and the textual locations
/// that get written into other artifacts (e.g. a manifest).
pub trait ArtifactStore: Send + Sync {
    /// Whether the artifact has been committed.
    fn exists(&self, id: &ArtifactId) -> bool;

    /// Textual location of an artifact.
    fn locate(&self, id: &ArtifactId) -> String;

    /// Inverse of `locate`. `None` if the location is foreign to this store.
    fn identify(&self, location: &str) -> Option<ArtifactId>;

    /// Open a committed artifact for reading.
    fn open_read(&self, id: &ArtifactId) -> Result<Box<dyn Read + '_>, StoreError>;

    /// Start writing an artifact. Replaces any previous content on commit.
    fn open_write(&self, id: &ArtifactId) -> Result<Box<dyn ArtifactSink + '_>, StoreError>;

    /// Read a whole artifact as bytes.
    fn read_bytes(&self, id: &ArtifactId) -> Result<Vec<u8>, StoreError> {
        let mut reader = self.open_read(id)?;
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| StoreError::io(id, e))?;
        Ok(data)
    }

    /// Read a whole artifact as UTF-8 text.
    fn read_to_string(&self, id: &ArtifactId) -> Result<String, StoreError> {
        let data = self.read_bytes(id)?;
        String::from_utf8(data).map_err(|e| StoreError::Io {
            id: id.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })
    }

    /// Write and commit an artifact in one go.
    fn write_bytes(&self, id: &ArtifactId, data: &[u8]) -> Result<(), StoreError> {
        let mut sink = self.open_write(id)?;
        sink.write_all(data).map_err(|e| StoreError::io(id, e))?;
        sink.commit()
    }
}

// ============================================================================
// File system store
// ============================================================================

/// Stores artifacts as files below a root directory.
///
/// Writes go to a `.partial` sibling that is renamed into place on commit,
/// so a crashed step never leaves an output that looks complete.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of an artifact on disk.
    pub fn path_of(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(id.as_str())
    }
}

impl ArtifactStore for FsStore {
    fn exists(&self, id: &ArtifactId) -> bool {
        self.path_of(id).is_file()
    }

    fn locate(&self, id: &ArtifactId) -> String {
        self.path_of(id).display().to_string()
    }

    fn identify(&self, location: &str) -> Option<ArtifactId> {
        let relative = Path::new(location).strip_prefix(&self.root).ok()?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?
            .join("/");
        if name.is_empty() {
            return None;
        }
        Some(ArtifactId::new(name))
    }

    fn open_read(&self, id: &ArtifactId) -> Result<Box<dyn Read + '_>, StoreError> {
        let file = File::open(self.path_of(id)).map_err(|e| StoreError::io(id, e))?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn open_write(&self, id: &ArtifactId) -> Result<Box<dyn ArtifactSink + '_>, StoreError> {
        let dest = self.path_of(id);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(id, e))?;
        }
        let mut partial = dest.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);
        let file = File::create(&partial).map_err(|e| StoreError::io(id, e))?;

        Ok(Box::new(FsSink {
            id: id.clone(),
            file: Some(BufWriter::new(file)),
            partial,
            dest,
        }))
    }
}

struct FsSink {
    id: ArtifactId,
    file: Option<BufWriter<File>>,
    partial: PathBuf,
    dest: PathBuf,
}

impl Write for FsSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::Error::other("artifact already committed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl ArtifactSink for FsSink {
    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Some(file) = self.file.take() {
            let file = file
                .into_inner()
                .map_err(|e| StoreError::io(&self.id, e.into_error()))?;
            file.sync_all().map_err(|e| StoreError::io(&self.id, e))?;
        }
        fs::rename(&self.partial, &self.dest).map_err(|e| StoreError::io(&self.id, e))
    }
}

impl Drop for FsSink {
    fn drop(&mut self) {
        // No-op after a successful commit: the partial file was renamed.
        drop(self.file.take());
        let _ = fs::remove_file(&self.partial);
    }
}

// ============================================================================
// In-memory store
// ============================================================================

const MEMORY_SCHEME: &str = "memory://";

/// Keeps artifacts in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: Mutex<IndexMap<ArtifactId, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete an artifact, forcing its producer to run again.
    pub fn remove(&self, id: &ArtifactId) -> Result<bool, StoreError> {
        let mut artifacts = self.artifacts.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(artifacts.shift_remove(id).is_some())
    }
}

impl ArtifactStore for MemoryStore {
    fn exists(&self, id: &ArtifactId) -> bool {
        self.artifacts
            .lock()
            .map(|a| a.contains_key(id))
            .unwrap_or(false)
    }

    fn locate(&self, id: &ArtifactId) -> String {
        format!("{MEMORY_SCHEME}{id}")
    }

    fn identify(&self, location: &str) -> Option<ArtifactId> {
        location
            .strip_prefix(MEMORY_SCHEME)
            .filter(|name| !name.is_empty())
            .map(ArtifactId::new)
    }

    fn open_read(&self, id: &ArtifactId) -> Result<Box<dyn Read + '_>, StoreError> {
        let artifacts = self.artifacts.lock().map_err(|_| StoreError::LockPoisoned)?;
        let data = artifacts
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn open_write(&self, id: &ArtifactId) -> Result<Box<dyn ArtifactSink + '_>, StoreError> {
        Ok(Box::new(MemorySink {
            store: self,
            id: id.clone(),
            buf: Vec::new(),
        }))
    }
}

struct MemorySink<'a> {
    store: &'a MemoryStore,
    id: ArtifactId,
    buf: Vec<u8>,
}

impl Write for MemorySink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ArtifactSink for MemorySink<'_> {
    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemorySink { store, id, buf } = *self;
        let mut artifacts = store.artifacts.lock().map_err(|_| StoreError::LockPoisoned)?;
        artifacts.insert(id, buf);
        Ok(())
    }
}
