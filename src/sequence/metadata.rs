//! Sequence metadata: sparse ranges and variable header records

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::header::SequenceHeader;
use crate::storage::StoredFile;

/// Size of the length + tag prefix on each variable record
pub const VARIABLE_RECORD_PREFIX: u64 = 4;

/// Size of one sparse range entry (24-bit start, 24-bit length)
pub const SPARSE_RANGE_ENTRY_SIZE: usize = 6;

/// Media filename record
pub const TAG_MEDIA_FILENAME: &str = "mf";

/// Sparse / producer record
pub const TAG_SPARSE: &str = "sp";

/// A contiguous span of virtual channel numbers the stored data covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SparseRange {
    #[serde(rename = "Start")]
    pub start: u32,
    #[serde(rename = "Length")]
    pub length: u32,
}

impl SparseRange {
    pub fn parse(entry: &[u8; SPARSE_RANGE_ENTRY_SIZE]) -> Self {
        Self {
            start: read_u24(&entry[0..3]),
            length: read_u24(&entry[3..6]),
        }
    }

    /// Highest channel number inside this range
    pub fn last_channel(&self) -> u32 {
        (self.start + self.length).saturating_sub(1)
    }
}

fn read_u24(b: &[u8]) -> u32 {
    u32::from(b[0]) | u32::from(b[1]) << 8 | u32::from(b[2]) << 16
}

/// A recognized variable record, reported as `{ "<code>": "<value>" }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableHeader {
    pub code: String,
    pub value: String,
}

impl Serialize for VariableHeader {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.code, &self.value)?;
        map.end()
    }
}

/// Metadata document for one sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceMetadata {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Version")]
    pub version: String,
    /// 64-bit identifier, serialized as a string so it survives JSON number precision
    #[serde(rename = "ID", serialize_with = "serialize_id")]
    pub id: u64,
    #[serde(rename = "StepTime")]
    pub step_time: u8,
    #[serde(rename = "NumFrames")]
    pub frame_count: u32,
    #[serde(rename = "CompressionType")]
    pub compression_type: u8,
    #[serde(rename = "ChannelCount")]
    pub channel_count: u32,
    #[serde(rename = "MaxChannel")]
    pub max_channel: u32,
    #[serde(rename = "Ranges", skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<SparseRange>,
    #[serde(rename = "variableHeaders", skip_serializing_if = "Vec::is_empty")]
    pub variable_headers: Vec<VariableHeader>,
    #[serde(skip)]
    pub media_filename: Option<String>,
}

fn serialize_id<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(id)
}

impl SequenceMetadata {
    /// Assemble the document from a header and what was read after it
    pub fn new(
        header: &SequenceHeader,
        ranges: Vec<SparseRange>,
        variable_headers: Vec<VariableHeader>,
    ) -> Self {
        let max_channel = if ranges.is_empty() {
            header.channel_count
        } else {
            ranges.iter().map(SparseRange::last_channel).max().unwrap_or(0)
        };

        let media_filename = variable_headers
            .iter()
            .find(|h| h.code == TAG_MEDIA_FILENAME)
            .map(|h| h.value.clone());

        Self {
            name: String::new(),
            version: header.version_string(),
            id: header.id,
            step_time: header.step_time_ms,
            frame_count: header.frame_count,
            compression_type: header.compression_type,
            channel_count: header.channel_count,
            max_channel,
            ranges,
            variable_headers,
            media_filename,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Read the sparse range table declared by the header.
///
/// A table cut short by the end of the file yields only the complete entries.
pub fn read_sparse_ranges(
    file: &mut dyn StoredFile,
    header: &SequenceHeader,
) -> std::io::Result<Vec<SparseRange>> {
    let count = usize::from(header.sparse_range_count);
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut table = vec![0u8; count * SPARSE_RANGE_ENTRY_SIZE];
    let n = file.read_at(header.sparse_table_offset(), &mut table)?;
    if n < table.len() {
        tracing::warn!(
            "Sparse range table truncated: {} of {} bytes",
            n,
            table.len()
        );
    }

    Ok(table[..n]
        .chunks_exact(SPARSE_RANGE_ENTRY_SIZE)
        .map(|chunk| {
            let mut entry = [0u8; SPARSE_RANGE_ENTRY_SIZE];
            entry.copy_from_slice(chunk);
            SparseRange::parse(&entry)
        })
        .collect())
}

/// Walk the variable records between `header_len` and `data_offset`.
///
/// Only `mf` and `sp` payloads are materialized; every record is skipped by
/// its declared length. A record overrunning `data_offset` is cut at the
/// boundary, and a declared length too small to cover its own prefix ends
/// the walk.
pub fn read_variable_headers(
    file: &mut dyn StoredFile,
    header: &SequenceHeader,
) -> std::io::Result<Vec<VariableHeader>> {
    let end = u64::from(header.data_offset);
    let mut cursor = u64::from(header.header_len);
    let mut headers = Vec::new();

    while cursor < end {
        if end - cursor < VARIABLE_RECORD_PREFIX {
            break;
        }

        let mut prefix = [0u8; VARIABLE_RECORD_PREFIX as usize];
        if file.read_at(cursor, &mut prefix)? < prefix.len() {
            break;
        }

        let declared = u64::from(u16::from_le_bytes([prefix[0], prefix[1]]));
        let code = String::from_utf8_lossy(&prefix[2..4]).into_owned();

        if declared < VARIABLE_RECORD_PREFIX {
            tracing::warn!(
                "Variable record '{}' at {} declares length {}; stopping",
                code,
                cursor,
                declared
            );
            break;
        }

        if code == TAG_MEDIA_FILENAME || code == TAG_SPARSE {
            let record_end = (cursor + declared).min(end);
            let payload_len = (record_end - cursor - VARIABLE_RECORD_PREFIX) as usize;
            let mut payload = vec![0u8; payload_len];
            let n = file.read_at(cursor + VARIABLE_RECORD_PREFIX, &mut payload)?;
            payload.truncate(n);

            if let Some(nul) = payload.iter().position(|&b| b == 0) {
                payload.truncate(nul);
            }

            headers.push(VariableHeader {
                code,
                value: String::from_utf8_lossy(&payload).into_owned(),
            });
        } else {
            tracing::trace!("Skipping variable record '{}' ({} bytes)", code, declared);
        }

        cursor += declared;
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::testing::SequenceBuilder;
    use crate::storage::{MemoryStore, SequenceStore};

    fn open(bytes: Vec<u8>) -> (Box<dyn StoredFile>, SequenceHeader) {
        let store = MemoryStore::new();
        let header = SequenceHeader::parse(&bytes).unwrap();
        store.insert("s", bytes);
        (store.open("s").unwrap(), header)
    }

    #[test]
    fn test_sparse_range_parse() {
        let range = SparseRange::parse(&[0x01, 0x02, 0x03, 0x10, 0x00, 0x00]);
        assert_eq!(range.start, 0x030201);
        assert_eq!(range.length, 16);
        assert_eq!(range.last_channel(), 0x030201 + 15);
    }

    #[test]
    fn test_ranges_after_block_index() {
        let bytes = SequenceBuilder::new(30, 2)
            .compressed_blocks(2)
            .range(100, 10)
            .range(500, 20)
            .build();
        let (mut file, header) = open(bytes);

        let ranges = read_sparse_ranges(file.as_mut(), &header).unwrap();
        assert_eq!(
            ranges,
            vec![
                SparseRange { start: 100, length: 10 },
                SparseRange { start: 500, length: 20 },
            ]
        );

        let meta = SequenceMetadata::new(&header, ranges, Vec::new());
        assert_eq!(meta.max_channel, 519);
        assert_eq!(meta.channel_count, 30);
    }

    #[test]
    fn test_recognized_and_unknown_records() {
        let bytes = SequenceBuilder::new(4, 1)
            .record("mf", b"song.mp3\0")
            .record("zz", b"ignored payload")
            .record("sp", b"xLights")
            .build();
        let (mut file, header) = open(bytes);

        let headers = read_variable_headers(file.as_mut(), &header).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].code, "mf");
        assert_eq!(headers[0].value, "song.mp3");
        assert_eq!(headers[1].code, "sp");
        assert_eq!(headers[1].value, "xLights");

        let meta = SequenceMetadata::new(&header, Vec::new(), headers);
        assert_eq!(meta.media_filename.as_deref(), Some("song.mp3"));
    }

    #[test]
    fn test_overrunning_record_is_cut_at_data_offset() {
        // Declares 200 bytes but only 6 payload bytes precede the frame data
        let bytes = SequenceBuilder::new(4, 2)
            .raw_record(200, "mf", b"abc\x01\x02\x03")
            .build();
        let (mut file, header) = open(bytes);

        let headers = read_variable_headers(file.as_mut(), &header).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].value, "abc\u{1}\u{2}\u{3}");
    }

    #[test]
    fn test_degenerate_length_ends_walk() {
        let bytes = SequenceBuilder::new(4, 1)
            .raw_record(0, "mf", b"")
            .record("sp", b"never reached")
            .build();
        let (mut file, header) = open(bytes);

        let headers = read_variable_headers(file.as_mut(), &header).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_metadata_json_shape() {
        let bytes = SequenceBuilder::new(512, 300)
            .id(u64::MAX)
            .record("mf", b"a.mp3")
            .build();
        let (mut file, header) = open(bytes);
        let headers = read_variable_headers(file.as_mut(), &header).unwrap();
        let meta = SequenceMetadata::new(&header, Vec::new(), headers).with_name("show.fseq");

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["Name"], "show.fseq");
        assert_eq!(json["Version"], "2.0");
        assert_eq!(json["ID"], u64::MAX.to_string());
        assert_eq!(json["MaxChannel"], 512);
        assert_eq!(json["variableHeaders"][0]["mf"], "a.mp3");
        assert!(json.get("Ranges").is_none());
    }
}
