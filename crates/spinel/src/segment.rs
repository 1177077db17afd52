//! Segment files: the on-disk units of the log.
//!
//! A segment is one append-only file of encoded records, named by its
//! zero-padded numeric id (`000000042.data`). Exactly one segment is active
//! at a time; rotated segments are immutable and only ever read.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fio::{FileIo, LogIo};
use crate::record::{self, LogRecord};

/// Extension shared by every segment file in a data directory.
pub(crate) const SEGMENT_FILE_SUFFIX: &str = ".data";

/// Builds the path of segment `id` inside `dir`.
pub(crate) fn segment_path(dir: &Path, id: u32) -> PathBuf {
    dir.join(format!("{id:09}{SEGMENT_FILE_SUFFIX}"))
}

/// One append-only log file with a running write offset.
///
/// `write_offset` equals the file size after every completed append; the
/// engine checks it before writing so no record ever straddles a segment
/// boundary.
pub(crate) struct Segment {
    id: u32,
    write_offset: i64,
    io: Box<dyn LogIo>,
}

impl Segment {
    /// Opens (or creates) the segment file for `id` in `dir`.
    pub(crate) fn open(dir: &Path, id: u32) -> Result<Self> {
        let io = FileIo::open(&segment_path(dir, id))?;
        let write_offset = io.size()? as i64;
        Ok(Self {
            id,
            write_offset,
            io: Box::new(io),
        })
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn write_offset(&self) -> i64 {
        self.write_offset
    }

    /// Appends pre-encoded record bytes and advances the write offset.
    pub(crate) fn append(&mut self, buf: &[u8]) -> Result<()> {
        let n = self.io.append(buf)?;
        self.write_offset += n as i64;
        Ok(())
    }

    /// Decodes the record starting at `offset`, returning it with its size.
    pub(crate) fn read_record(&self, offset: i64) -> Result<(LogRecord, i64)> {
        record::read_record(self.io.as_ref(), offset)
    }

    pub(crate) fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    /// Cuts the file back to `size` bytes. Only recovery calls this, to
    /// discard a torn tail in the segment that was active at crash time.
    pub(crate) fn truncate(&mut self, size: i64) -> Result<()> {
        self.io.truncate(size as u64)?;
        self.write_offset = size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::record::{LogRecord, RecordKind, encode_record};

    #[test]
    fn path_is_zero_padded() {
        let path = segment_path(Path::new("/tmp/db"), 42);
        assert_eq!(path, Path::new("/tmp/db/000000042.data"));
    }

    #[test]
    fn append_advances_write_offset() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 0).unwrap();
        assert_eq!(segment.write_offset(), 0);

        let (encoded, size) =
            encode_record(&LogRecord::new(Bytes::from("k"), Bytes::from("v"), RecordKind::Normal));
        segment.append(&encoded).unwrap();
        assert_eq!(segment.write_offset(), size);

        segment.append(&encoded).unwrap();
        assert_eq!(segment.write_offset(), size * 2);
    }

    #[test]
    fn records_read_back_at_their_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 7).unwrap();

        let records = [
            LogRecord::new(Bytes::from("name"), Bytes::from("spinel"), RecordKind::Normal),
            LogRecord::new(Bytes::from("name"), Bytes::from("a new value"), RecordKind::Normal),
            LogRecord::new(Bytes::from("1"), Bytes::from("1"), RecordKind::Tombstone),
        ];

        let mut offsets = Vec::new();
        for record in &records {
            offsets.push(segment.write_offset());
            let (encoded, _) = encode_record(record);
            segment.append(&encoded).unwrap();
        }

        for (record, offset) in records.iter().zip(offsets) {
            let (decoded, _) = segment.read_record(offset).unwrap();
            assert_eq!(&decoded, record);
        }
    }

    #[test]
    fn reopen_resumes_at_file_end() {
        let dir = tempfile::tempdir().unwrap();
        let (encoded, size) =
            encode_record(&LogRecord::new(Bytes::from("k"), Bytes::from("v"), RecordKind::Normal));

        {
            let mut segment = Segment::open(dir.path(), 3).unwrap();
            segment.append(&encoded).unwrap();
            segment.sync().unwrap();
        }

        let segment = Segment::open(dir.path(), 3).unwrap();
        assert_eq!(segment.write_offset(), size);
    }
}
