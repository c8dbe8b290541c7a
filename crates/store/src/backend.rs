//! Persistence backends for the serialized store blob
//!
//! A backend holds exactly one blob. Writes replace it atomically: a reader
//! never sees a partially written blob.

use crate::{Result, StoreError};
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// `ENOSPC` on Linux and macOS
const NO_SPACE_OS_ERROR: i32 = 28;

/// Storage for the single serialized store blob
pub trait StorageBackend: Send + Sync {
    /// Read the blob, or `None` if nothing has been written yet
    fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Atomically replace the blob
    fn save(&self, bytes: &[u8]) -> Result<()>;

    /// Remove the blob entirely
    fn clear(&self) -> Result<()>;
}

/// File-backed storage using write-to-temp then rename
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
    max_bytes: Option<usize>,
}

impl FileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_bytes: None,
        }
    }

    /// Reject writes larger than `max_bytes` with a quota error
    pub fn with_quota(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

impl StorageBackend for FileBackend {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, bytes: &[u8]) -> Result<()> {
        if self.max_bytes.is_some_and(|max| bytes.len() > max) {
            return Err(StoreError::StorageQuotaExceeded);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.temp_path();
        let write = || -> std::io::Result<()> {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&temp_path);
            if e.raw_os_error() == Some(NO_SPACE_OS_ERROR) {
                return Err(StoreError::StorageQuotaExceeded);
            }
            return Err(e.into());
        }

        // Atomic rename
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory storage, shared between clones.
///
/// Useful for tests and for running without a writable data directory.
/// Clones observe the same blob, which lets a test simulate a restart by
/// opening a second store over a clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    blob: Arc<Mutex<Option<Vec<u8>>>>,
    max_bytes: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Overwrite the stored blob directly, bypassing quota checks
    pub fn set_raw(&self, bytes: Vec<u8>) {
        *self.blob.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes);
    }

    /// Size of the stored blob in bytes
    pub fn stored_len(&self) -> usize {
        self.blob
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Vec::len)
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.blob.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, bytes: &[u8]) -> Result<()> {
        if self.max_bytes.is_some_and(|max| bytes.len() > max) {
            return Err(StoreError::StorageQuotaExceeded);
        }
        *self.blob.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes.to_vec());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.blob.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_backend_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("store.json"));
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn test_file_backend_save_and_load() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("nested").join("store.json"));

        backend.save(b"{\"a\":1}").unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"{\"a\":1}");
        assert!(!backend.temp_path().exists());
    }

    #[test]
    fn test_file_backend_quota() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("store.json")).with_quota(4);

        let result = backend.save(b"too large");
        assert!(matches!(result, Err(StoreError::StorageQuotaExceeded)));
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn test_file_backend_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("store.json"));
        backend.save(b"x").unwrap();
        backend.clear().unwrap();
        backend.clear().unwrap();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn test_memory_backend_clones_share_blob() {
        let backend = MemoryBackend::new();
        let other = backend.clone();
        backend.save(b"abc").unwrap();
        assert_eq!(other.load().unwrap().unwrap(), b"abc");
        assert_eq!(other.stored_len(), 3);
    }

    #[test]
    fn test_memory_backend_quota_keeps_previous_blob() {
        let backend = MemoryBackend::new().with_quota(3);
        backend.save(b"abc").unwrap();
        assert!(matches!(
            backend.save(b"abcd"),
            Err(StoreError::StorageQuotaExceeded)
        ));
        assert_eq!(backend.load().unwrap().unwrap(), b"abc");
    }
}
