//! Error types for the store.

use std::io;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the store.
///
/// Decoding reports end-of-log as [`StoreError::UnexpectedEof`]; recovery
/// treats it as the clean end of a segment, while [`StoreError::CorruptRecord`]
/// in a rotated segment fails the open.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("key is empty")]
    EmptyKey,

    #[error("data directory path is empty")]
    EmptyDirPath,

    #[error("segment size limit must be positive")]
    InvalidSegmentSize,

    #[error("key not found")]
    KeyNotFound,

    #[error("index update failed")]
    IndexUpdateFailed,

    #[error("segment file {0} not found")]
    DataFileNotFound(u32),

    #[error("corrupted record: CRC mismatch")]
    CorruptRecord,

    #[error("unexpected end of log")]
    UnexpectedEof,

    #[error("corruption in segment {segment_id} at offset {offset}")]
    Corruption { segment_id: u32, offset: i64 },

    #[error("write batch is empty")]
    EmptyBatch,

    #[error("write batch exceeds {0} staged entries")]
    BatchTooLarge(u32),

    #[error("internal error: {0}")]
    Internal(&'static str),

    #[error("I/O error")]
    Io(#[from] io::Error),
}
