//! # Spinel: an embedded log-structured key-value store
//!
//! Spinel maps opaque byte keys to opaque byte values. Every mutation is a
//! record appended to an on-disk log; an in-memory ordered index maps each
//! live key to the position of the record holding its latest value. The
//! design follows the Bitcask model: fixed-size segment files, a single
//! writer, crash recovery by replaying the log.
//!
//! - CRC32-checksummed records with varint lengths ([`record`])
//! - Append-only segment files with size-triggered rotation ([`segment`])
//! - Atomic multi-key write batches via an on-disk commit sentinel
//!   ([`WriteBatch`])
//! - Prefix/reverse range iteration over an index snapshot ([`StoreIter`])
//!
//! ```no_run
//! use spinel::{Options, Store};
//!
//! # fn main() -> spinel::Result<()> {
//! let store = Store::open(Options::new("/tmp/spinel-demo"))?;
//! store.put(b"greeting", "hello")?;
//! assert_eq!(store.get(b"greeting")?.as_ref(), b"hello");
//! store.delete(b"greeting")?;
//! # Ok(())
//! # }
//! ```
//!
//! The store is embedded in a single process. Cross-process access to one
//! data directory, compaction of dead records and secondary indexes are out
//! of scope.

mod batch;
mod error;
mod fio;
mod index;
mod iterator;
mod options;
mod record;
mod segment;
mod store;

pub use batch::WriteBatch;
pub use error::{Result, StoreError};
pub use fio::{FileIo, LogIo};
pub use index::{BTreeIndex, Index, IndexIter};
pub use iterator::StoreIter;
pub use options::{BatchOptions, IterOptions, Options};
pub use record::{Position, RecordKind};
pub use store::Store;
