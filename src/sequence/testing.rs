//! Builds in-memory sequence files for tests

use bytes::{BufMut, BytesMut};

use super::header::{HEADER_SIZE, MAGIC_PSEQ};

/// Byte value stored in every channel of `frame`
pub(crate) fn frame_byte(frame: u32) -> u8 {
    (frame % 251) as u8 + 1
}

pub(crate) struct SequenceBuilder {
    channel_count: u32,
    frame_count: u32,
    step_time: u8,
    major: u8,
    minor: u8,
    compression: u8,
    compressed_blocks: u8,
    id: u64,
    ranges: Vec<(u32, u32)>,
    records: Vec<(Vec<u8>, [u8; 2], Vec<u8>)>,
    stored_frames: Option<u32>,
    truncate_to: Option<usize>,
}

impl SequenceBuilder {
    pub(crate) fn new(channel_count: u32, frame_count: u32) -> Self {
        Self {
            channel_count,
            frame_count,
            step_time: 50,
            major: 2,
            minor: 0,
            compression: 0,
            compressed_blocks: 0,
            id: 0,
            ranges: Vec::new(),
            records: Vec::new(),
            stored_frames: None,
            truncate_to: None,
        }
    }

    pub(crate) fn step_time(mut self, ms: u8) -> Self {
        self.step_time = ms;
        self
    }

    pub(crate) fn version(mut self, major: u8, minor: u8) -> Self {
        self.major = major;
        self.minor = minor;
        self
    }

    pub(crate) fn compression(mut self, compression: u8) -> Self {
        self.compression = compression;
        self
    }

    pub(crate) fn compressed_blocks(mut self, blocks: u8) -> Self {
        self.compressed_blocks = blocks;
        self
    }

    pub(crate) fn id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub(crate) fn range(mut self, start: u32, length: u32) -> Self {
        self.ranges.push((start, length));
        self
    }

    /// Append a well-formed variable record
    pub(crate) fn record(self, code: &str, payload: &[u8]) -> Self {
        let declared = (payload.len() + 4) as u16;
        self.raw_record(declared, code, payload)
    }

    /// Append a record with an arbitrary declared length
    pub(crate) fn raw_record(mut self, declared: u16, code: &str, payload: &[u8]) -> Self {
        let mut tag = [0u8; 2];
        tag.copy_from_slice(&code.as_bytes()[..2]);
        self.records
            .push((declared.to_le_bytes().to_vec(), tag, payload.to_vec()));
        self
    }

    /// Store fewer frames than the header declares
    pub(crate) fn stored_frames(mut self, frames: u32) -> Self {
        self.stored_frames = Some(frames);
        self
    }

    /// Cut the finished file to `len` bytes
    pub(crate) fn truncate_to(mut self, len: usize) -> Self {
        self.truncate_to = Some(len);
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut body = BytesMut::new();
        body.put_bytes(0, 8 * self.compressed_blocks as usize);
        for (start, length) in &self.ranges {
            body.put_slice(&start.to_le_bytes()[..3]);
            body.put_slice(&length.to_le_bytes()[..3]);
        }

        let header_len = HEADER_SIZE + body.len();
        for (declared, tag, payload) in &self.records {
            body.put_slice(declared);
            body.put_slice(tag);
            body.put_slice(payload);
        }
        let data_offset = HEADER_SIZE + body.len();

        let mut out = BytesMut::with_capacity(data_offset);
        out.put_slice(MAGIC_PSEQ);
        out.put_u16_le(data_offset as u16);
        out.put_u8(self.minor);
        out.put_u8(self.major);
        out.put_u16_le(header_len as u16);
        out.put_u32_le(self.channel_count);
        out.put_u32_le(self.frame_count);
        out.put_u8(self.step_time);
        out.put_u8(0);
        out.put_u8(self.compression);
        out.put_u8(self.compressed_blocks);
        out.put_u8(self.ranges.len() as u8);
        out.put_u8(0);
        out.put_u64_le(self.id);
        out.put_slice(&body);

        for frame in 0..self.stored_frames.unwrap_or(self.frame_count) {
            out.put_bytes(frame_byte(frame), self.channel_count as usize);
        }

        let mut bytes = out.to_vec();
        if let Some(len) = self.truncate_to {
            bytes.truncate(len);
        }
        bytes
    }
}
