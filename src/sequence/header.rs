//! Fixed sequence header

use bytes::Buf;

use crate::error::SequenceError;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 32;

/// Magic written by version 2 sequence writers
pub const MAGIC_PSEQ: &[u8; 4] = b"PSEQ";

/// Legacy magic, still found on some version 2 files
pub const MAGIC_FSEQ: &[u8; 4] = b"FSEQ";

/// The only major version this engine plays
pub const SUPPORTED_MAJOR_VERSION: u8 = 2;

/// Compression type value for uncompressed frame data
pub const COMPRESSION_NONE: u8 = 0;

/// Size of one compressed-block index entry
const COMPRESSED_BLOCK_ENTRY_SIZE: u64 = 8;

/// Decoded fixed header (little-endian on disk)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceHeader {
    pub magic: [u8; 4],
    /// Byte offset where frame data begins
    pub data_offset: u16,
    pub minor_version: u8,
    pub major_version: u8,
    /// Byte offset of the first variable metadata record
    pub header_len: u16,
    /// Bytes per frame
    pub channel_count: u32,
    pub frame_count: u32,
    pub step_time_ms: u8,
    pub flags: u8,
    pub compression_type: u8,
    pub compressed_block_count: u8,
    pub sparse_range_count: u8,
    pub flags2: u8,
    pub id: u64,
}

impl SequenceHeader {
    /// Decode the fixed header from the first bytes of a file.
    ///
    /// Only structure is checked here (length and magic); playability is
    /// checked by [`SequenceHeader::validate`].
    pub fn parse(data: &[u8]) -> Result<Self, SequenceError> {
        if data.len() < HEADER_SIZE {
            return Err(SequenceError::BadHeader(format!(
                "file too short: {} of {} header bytes",
                data.len(),
                HEADER_SIZE
            )));
        }

        let mut buf = &data[..HEADER_SIZE];

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC_PSEQ && &magic != MAGIC_FSEQ {
            return Err(SequenceError::BadHeader(format!(
                "bad magic {:02x?}",
                magic
            )));
        }

        Ok(Self {
            magic,
            data_offset: buf.get_u16_le(),
            minor_version: buf.get_u8(),
            major_version: buf.get_u8(),
            header_len: buf.get_u16_le(),
            channel_count: buf.get_u32_le(),
            frame_count: buf.get_u32_le(),
            step_time_ms: buf.get_u8(),
            flags: buf.get_u8(),
            compression_type: buf.get_u8(),
            compressed_block_count: buf.get_u8(),
            sparse_range_count: buf.get_u8(),
            flags2: buf.get_u8(),
            id: buf.get_u64_le(),
        })
    }

    /// Reject anything other than an uncompressed version 2 sequence
    pub fn validate(&self) -> Result<(), SequenceError> {
        if self.major_version != SUPPORTED_MAJOR_VERSION
            || self.compression_type != COMPRESSION_NONE
        {
            return Err(SequenceError::UnsupportedFormat {
                major: self.major_version,
                minor: self.minor_version,
                compression: self.compression_type,
            });
        }
        Ok(())
    }

    /// Version as reported to leaders, e.g. `"2.0"`
    pub fn version_string(&self) -> String {
        format!("{}.{}", self.major_version, self.minor_version)
    }

    /// Frame step in milliseconds, never zero
    pub fn step_time(&self) -> u32 {
        u32::from(self.step_time_ms).max(1)
    }

    /// Byte offset of a frame: `data_offset + channel_count * frame`
    pub fn frame_offset(&self, frame: u32) -> u64 {
        u64::from(self.data_offset) + u64::from(self.channel_count) * u64::from(frame)
    }

    /// Sparse ranges follow the compressed-block index
    pub fn sparse_table_offset(&self) -> u64 {
        HEADER_SIZE as u64 + COMPRESSED_BLOCK_ENTRY_SIZE * u64::from(self.compressed_block_count)
    }

    /// Total playing time in milliseconds
    pub fn duration_ms(&self) -> u64 {
        u64::from(self.frame_count) * u64::from(self.step_time())
    }
}
