//! Error types for the sequence playback and sync engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Sequence error: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sequence file errors
#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("Sequence not found: {0}")]
    NotFound(String),

    #[error("Bad sequence header: {0}")]
    BadHeader(String),

    #[error("Unsupported sequence format: version {major}.{minor}, compression {compression}")]
    UnsupportedFormat {
        major: u8,
        minor: u8,
        compression: u8,
    },

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Storage unavailable")]
    StorageUnavailable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SequenceError {
    /// Whether this failure means the file itself is unusable, as opposed
    /// to a transient storage problem.
    pub fn is_invalid_file(&self) -> bool {
        matches!(
            self,
            SequenceError::NotFound(_)
                | SequenceError::BadHeader(_)
                | SequenceError::UnsupportedFormat { .. }
        )
    }
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// Control datagram decoding errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Truncated {kind} packet: need {expected} bytes, got {actual}")]
    Truncated {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Bad packet tag")]
    BadTag,

    #[error("Unknown packet type: {0:#04x}")]
    UnknownPacketType(u8),

    #[error("Unknown sync action: {0:#04x}")]
    UnknownSyncAction(u8),

    #[error("Declared length {declared} exceeds datagram of {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;
