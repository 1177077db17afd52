//! Configuration for the store, write batches and range iterators.

use std::path::PathBuf;

use bytes::Bytes;

use crate::error::{Result, StoreError};

/// Default maximum segment size before rotation (256 MiB).
const DEFAULT_SEGMENT_SIZE_LIMIT: u64 = 256 * 1024 * 1024;

/// Default cap on entries staged in one write batch.
const DEFAULT_MAX_BATCH_NUM: u32 = 4;

/// Configuration for opening a [`Store`](crate::Store).
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory holding the segment files.
    pub dir_path: PathBuf,
    /// Maximum bytes per segment before a new active segment is created.
    pub segment_size_limit: u64,
    /// Fsync the active segment after every single-record append.
    pub sync_writes: bool,
}

impl Options {
    /// Creates options for the given data directory with default limits.
    pub fn new(dir_path: impl Into<PathBuf>) -> Self {
        Self {
            dir_path: dir_path.into(),
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(StoreError::EmptyDirPath);
        }
        if self.segment_size_limit == 0 {
            return Err(StoreError::InvalidSegmentSize);
        }
        Ok(())
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: PathBuf::from("."),
            segment_size_limit: DEFAULT_SEGMENT_SIZE_LIMIT,
            sync_writes: false,
        }
    }
}

/// Configuration for a [`WriteBatch`](crate::WriteBatch).
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Upper bound on staged entries per batch.
    pub max_batch_num: u32,
    /// Fsync the active segment after the commit sentinel is written.
    pub sync_on_commit: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_batch_num: DEFAULT_MAX_BATCH_NUM,
            sync_on_commit: false,
        }
    }
}

/// Configuration for a range iterator.
#[derive(Debug, Clone, Default)]
pub struct IterOptions {
    /// Only visit keys beginning with this prefix; empty matches everything.
    pub prefix: Bytes,
    /// Walk keys in descending order.
    pub reverse: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = Options::default();
        assert_eq!(options.segment_size_limit, 256 * 1024 * 1024);
        assert!(!options.sync_writes);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn empty_dir_path_rejected() {
        let options = Options::new("");
        assert!(matches!(options.validate(), Err(StoreError::EmptyDirPath)));
    }

    #[test]
    fn zero_segment_size_rejected() {
        let options = Options {
            segment_size_limit: 0,
            ..Options::new("/tmp/spinel")
        };
        assert!(matches!(options.validate(), Err(StoreError::InvalidSegmentSize)));
    }
}
