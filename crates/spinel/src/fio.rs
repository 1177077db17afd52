//! File I/O capability consumed by segments.
//!
//! The engine talks to segment files through the [`LogIo`] trait so tests and
//! alternative backends can substitute their own implementation. The standard
//! backend is [`FileIo`], an append-mode [`std::fs::File`] read with
//! positioned reads, so a single handle serves the writer and any number of
//! concurrent readers.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// Capability set required to back one segment file.
///
/// `read_at` may be called from any thread; `append` calls are serialized by
/// the engine's write path.
pub trait LogIo: Send + Sync {
    /// Reads into `buf` starting at `offset`, returning the bytes read.
    /// A read past the end of the file returns fewer bytes than requested.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Appends `buf` at the end of the file, returning the bytes written.
    fn append(&mut self, buf: &[u8]) -> Result<usize>;

    /// Flushes written bytes to stable storage.
    fn sync(&self) -> Result<()>;

    /// Current file size in bytes.
    fn size(&self) -> Result<u64>;

    /// Drops everything past `size`. Recovery uses this to cut a torn tail.
    fn truncate(&self, size: u64) -> Result<()>;
}

/// Standard-file implementation of [`LogIo`].
#[derive(Debug)]
pub struct FileIo {
    file: File,
}

impl FileIo {
    /// Opens `path` for appending, creating the file if absent.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        Ok(Self { file })
    }
}

impl LogIo for FileIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        #[cfg(unix)]
        let n = std::os::unix::fs::FileExt::read_at(&self.file, buf, offset)?;
        #[cfg(windows)]
        let n = std::os::windows::fs::FileExt::seek_read(&self.file, buf, offset)?;
        Ok(n)
    }

    fn append(&mut self, buf: &[u8]) -> Result<usize> {
        (&self.file).write_all(buf)?;
        Ok(buf.len())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn truncate(&self, size: u64) -> Result<()> {
        self.file.set_len(size)?;
        Ok(())
    }
}
