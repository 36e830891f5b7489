//! In-memory sequence storage
//!
//! Useful for embedding sequences in firmware images and for exercising
//! the engine without a filesystem.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{SequenceStore, StoredFile};

/// Named byte blobs held in memory
pub struct MemoryStore {
    files: RwLock<HashMap<String, Bytes>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// A store that reports its medium as missing
    pub fn unavailable() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            available: AtomicBool::new(false),
        }
    }

    /// Mark the medium as inserted or removed
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Add or replace a file
    pub fn insert(&self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.files.write().insert(name.into(), data.into());
    }

    pub fn remove(&self, name: &str) -> bool {
        self.files.write().remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceStore for MemoryStore {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn StoredFile>> {
        let data = self
            .files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;

        Ok(Box::new(MemoryFile { data }))
    }
}

struct MemoryFile {
    data: Bytes,
}

impl StoredFile for MemoryFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }

        let start = offset as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}
