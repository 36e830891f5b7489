//! Abstract file storage used by the sequence reader
//!
//! The engine never manages media or directories itself; it only opens
//! files by name and reads them at absolute offsets.

pub mod directory;
pub mod memory;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

use std::io;

/// An open, readable file
pub trait StoredFile: Send {
    /// Read into `buf` starting at `offset`.
    ///
    /// Returns the number of bytes actually read, which is smaller than
    /// `buf.len()` only when the end of the file was reached.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Total file length in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named file storage
pub trait SequenceStore: Send + Sync {
    /// Whether the backing medium is present at all
    fn is_available(&self) -> bool;

    /// Open a file for reading. Returns `ErrorKind::NotFound` when missing.
    fn open(&self, name: &str) -> io::Result<Box<dyn StoredFile>>;
}
