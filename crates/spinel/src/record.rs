//! Record codec for the append-only log.
//!
//! Every mutation is persisted as one [`LogRecord`]. Records are serialized
//! with a CRC32 checksum and varint-encoded lengths:
//!
//! ```text
//! ┌─────────┬──────┬─────────────┬─────────────┬───────┬─────────┐
//! │ crc32   │ kind │ key_len     │ val_len     │ key   │ value   │
//! │ 4 bytes │ 1 B  │ varint ≤5 B │ varint ≤5 B │ k_len │ v_len   │
//! └─────────┴──────┴─────────────┴─────────────┴───────┴─────────┘
//! ```
//!
//! The checksum covers everything after itself, so a bit flip anywhere in
//! `kind`, the lengths, the key or the value is detected on readback. Lengths
//! use zig-zag signed varints; a negative decoded length is corruption.
//! A header of all-zero CRC and lengths marks the end of a preallocated
//! (zero-filled) region and reads as end-of-log.

use bytes::Bytes;
use integer_encoding::VarInt;

use crate::error::{Result, StoreError};
use crate::fio::LogIo;

/// Upper bound on the serialized header: crc(4) + kind(1) + 2 varints (≤5 each).
pub(crate) const MAX_HEADER_SIZE: usize = 15;

/// Fixed prefix of the header: crc(4) + kind(1).
const FIXED_HEADER_SIZE: usize = 5;

/// What a log record means to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A live key/value pair.
    Normal,
    /// Logical deletion of the key.
    Tombstone,
    /// Sentinel terminating a committed write batch.
    TxnFinished,
}

impl RecordKind {
    pub(crate) fn as_byte(self) -> u8 {
        match self {
            RecordKind::Normal => 0,
            RecordKind::Tombstone => 1,
            RecordKind::TxnFinished => 2,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(RecordKind::Normal),
            1 => Some(RecordKind::Tombstone),
            2 => Some(RecordKind::TxnFinished),
            _ => None,
        }
    }
}

/// A single record in the log.
///
/// The key stored here is the on-disk key, i.e. the logical key prefixed
/// with a batch serial number (serial 0 for direct writes). A tombstone's
/// value is irrelevant on read and conventionally empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub(crate) key: Bytes,
    pub(crate) value: Bytes,
    pub(crate) kind: RecordKind,
}

impl LogRecord {
    pub(crate) fn new(key: Bytes, value: Bytes, kind: RecordKind) -> Self {
        Self { key, value, kind }
    }
}

/// Location of a record on disk: value type of the in-memory index.
///
/// A position always points at the first byte of a [`RecordKind::Normal`]
/// record holding the currently live value for its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Segment the record lives in.
    pub segment_id: u32,
    /// Byte offset of the record's first byte within that segment.
    pub offset: i64,
}

/// Serializes a record into a contiguous buffer.
///
/// Deterministic for a fixed input; the returned length equals the buffer
/// length and is what the record will occupy on disk.
pub(crate) fn encode_record(record: &LogRecord) -> (Bytes, i64) {
    let mut buf = Vec::with_capacity(MAX_HEADER_SIZE + record.key.len() + record.value.len());

    // CRC placeholder, filled in once the rest is serialized.
    buf.extend_from_slice(&[0u8; 4]);
    buf.push(record.kind.as_byte());

    let mut lens = [0u8; 10];
    let n = (record.key.len() as i32).encode_var(&mut lens);
    let m = (record.value.len() as i32).encode_var(&mut lens[n..]);
    buf.extend_from_slice(&lens[..n + m]);

    buf.extend_from_slice(&record.key);
    buf.extend_from_slice(&record.value);

    let crc = crc32fast::hash(&buf[4..]);
    buf[0..4].copy_from_slice(&crc.to_le_bytes());

    let size = buf.len() as i64;
    (Bytes::from(buf), size)
}

/// Reads the record starting at `offset` through an I/O capability.
///
/// Returns the decoded record and the total bytes it occupies on disk.
///
/// # Errors
///
/// - [`StoreError::UnexpectedEof`] at the end of the valid log: past the
///   file end, inside a truncated header, or at an all-zero header.
/// - [`StoreError::CorruptRecord`] when the checksum does not match, a
///   length decodes negative, or the kind byte is unknown.
pub(crate) fn read_record(io: &dyn LogIo, offset: i64) -> Result<(LogRecord, i64)> {
    let file_size = io.size()? as i64;
    if offset >= file_size {
        return Err(StoreError::UnexpectedEof);
    }

    let want = (file_size - offset).min(MAX_HEADER_SIZE as i64) as usize;
    let mut header = vec![0u8; want];
    let got = read_full(io, &mut header, offset as u64)?;
    if got < FIXED_HEADER_SIZE {
        return Err(StoreError::UnexpectedEof);
    }
    let header = &header[..got];

    let crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let kind_byte = header[4];

    let Some((key_len, n)) = i32::decode_var(&header[FIXED_HEADER_SIZE..]) else {
        return Err(StoreError::UnexpectedEof);
    };
    let Some((val_len, m)) = i32::decode_var(&header[FIXED_HEADER_SIZE + n..]) else {
        return Err(StoreError::UnexpectedEof);
    };

    // A zeroed-out header is the sentinel blank region of a preallocated file.
    if crc == 0 && key_len == 0 && val_len == 0 && kind_byte == 0 {
        return Err(StoreError::UnexpectedEof);
    }
    if key_len < 0 || val_len < 0 {
        return Err(StoreError::CorruptRecord);
    }
    let kind = RecordKind::from_byte(kind_byte).ok_or(StoreError::CorruptRecord)?;

    let header_size = FIXED_HEADER_SIZE + n + m;
    let body_len = key_len as usize + val_len as usize;

    let mut body = vec![0u8; body_len];
    let got = read_full(io, &mut body, (offset + header_size as i64) as u64)?;
    if got < body_len {
        return Err(StoreError::UnexpectedEof);
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header[4..header_size]);
    hasher.update(&body);
    if hasher.finalize() != crc {
        return Err(StoreError::CorruptRecord);
    }

    let body = Bytes::from(body);
    let record = LogRecord {
        key: body.slice(..key_len as usize),
        value: body.slice(key_len as usize..),
        kind,
    };
    Ok((record, (header_size + body_len) as i64))
}

/// Loops `read_at` until `buf` is full or the file ends.
fn read_full(io: &dyn LogIo, buf: &mut [u8], offset: u64) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = io.read_at(&mut buf[filled..], offset + filled as u64)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
