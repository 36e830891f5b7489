//! Open sequence files and read frames and metadata from them

use crate::error::SequenceError;
use crate::storage::{SequenceStore, StoredFile};

use super::header::{SequenceHeader, HEADER_SIZE};
use super::metadata::{read_sparse_ranges, read_variable_headers, SequenceMetadata};

/// A validated, open sequence file
pub struct SequenceFile {
    name: String,
    header: SequenceHeader,
    file: Box<dyn StoredFile>,
}

impl std::fmt::Debug for SequenceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceFile")
            .field("name", &self.name)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl SequenceFile {
    /// Open `name` and validate its header.
    ///
    /// The handle is dropped (closed) before any error is returned.
    pub fn open(store: &dyn SequenceStore, name: &str) -> Result<Self, SequenceError> {
        if !store.is_available() {
            return Err(SequenceError::StorageUnavailable);
        }

        let mut file = store.open(name).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SequenceError::NotFound(name.to_string()),
            _ => SequenceError::Io(e),
        })?;

        let mut raw = [0u8; HEADER_SIZE];
        let n = file.read_at(0, &mut raw)?;
        let header = SequenceHeader::parse(&raw[..n])?;
        header.validate()?;

        Ok(Self {
            name: name.to_string(),
            header,
            file,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &SequenceHeader {
        &self.header
    }

    /// Read `frame` into the front of `buf`.
    ///
    /// Reads `min(channel_count, buf.len())` bytes at the frame's stride
    /// offset and returns how many arrived. A count below the request means
    /// the file ended early; callers must stop rather than retry.
    pub fn read_frame(&mut self, frame: u32, buf: &mut [u8]) -> Result<usize, SequenceError> {
        let len = self.frame_read_len(buf.len());
        let pos = self.header.frame_offset(frame);
        Ok(self.file.read_at(pos, &mut buf[..len])?)
    }

    /// Bytes a frame read into a buffer of `buf_len` will request
    pub fn frame_read_len(&self, buf_len: usize) -> usize {
        (self.header.channel_count as usize).min(buf_len)
    }

    /// Collect the header fields, sparse ranges and recognized records
    pub fn read_metadata(&mut self) -> Result<SequenceMetadata, SequenceError> {
        let ranges = read_sparse_ranges(self.file.as_mut(), &self.header)?;
        let variable_headers = read_variable_headers(self.file.as_mut(), &self.header)?;
        Ok(SequenceMetadata::new(&self.header, ranges, variable_headers).with_name(&self.name))
    }

    pub fn close(self) {
        tracing::debug!("Closing sequence '{}'", self.name);
    }
}
