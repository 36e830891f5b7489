//! Sequence file format
//!
//! A sequence is a fixed 32-byte header, an optional compressed-block
//! index and sparse-range table, a chain of variable metadata records,
//! and then fixed-stride frame data starting at the header's data offset.
//! Only uncompressed version 2 files are playable.

pub mod header;
pub mod metadata;
pub mod reader;

#[cfg(test)]
pub(crate) mod testing;

pub use header::{SequenceHeader, HEADER_SIZE};
pub use metadata::{SequenceMetadata, SparseRange, VariableHeader};
pub use reader::SequenceFile;
