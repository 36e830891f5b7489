//! Sequence storage backed by a directory on the local filesystem

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use super::{SequenceStore, StoredFile};

/// Serves sequence files from a single flat directory
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a sequence name to a path inside the root.
    ///
    /// Names are flat: anything that would escape the root is refused.
    fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        let name = name.trim_start_matches('/');
        let relative = Path::new(name);
        let flat = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if name.is_empty() || !flat {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("invalid sequence name: {}", name),
            ));
        }

        Ok(self.root.join(relative))
    }
}

impl SequenceStore for DirectoryStore {
    fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn StoredFile>> {
        let path = self.resolve(name)?;
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        Ok(Box::new(DiskFile { file, len }))
    }
}

struct DiskFile {
    file: File,
    len: u64,
}

impl StoredFile for DiskFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(filled)
    }

    fn len(&self) -> u64 {
        self.len
    }
}
