//! The storage engine: directory lifecycle, appends, lookups and recovery.
//!
//! A [`Store`] owns one data directory:
//!
//! ```text
//! {dir_path}/
//! ├── 000000000.data   <- oldest segment (immutable)
//! ├── 000000001.data   <- ...
//! └── 000000002.data   <- active segment, the only one accepting appends
//! ```
//!
//! There is no manifest: the directory listing plus the segment contents are
//! authoritative. On open, every segment is replayed in id order to rebuild
//! the in-memory index; batched records are held back until their
//! `TxnFinished` sentinel proves the batch committed.
//!
//! # Invariants
//!
//! - Exactly one segment is active; rotated segments never receive bytes.
//! - No record straddles a segment boundary (rotation is checked before the
//!   write, so the decoder never has to span files).
//! - The index never points at a tombstone or a half-written record.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;

use crate::batch::{NON_TXN_SERIAL, WriteBatch, parse_record_key, serial_record_key};
use crate::error::{Result, StoreError};
use crate::index::{BTreeIndex, Index};
use crate::iterator::StoreIter;
use crate::options::{BatchOptions, IterOptions, Options};
use crate::record::{LogRecord, Position, RecordKind, encode_record};
use crate::segment::{SEGMENT_FILE_SUFFIX, Segment};

/// Embedded log-structured key-value store.
///
/// All public operations are synchronous and safe to call from any thread:
/// writes serialize behind an exclusive lock, reads share it.
pub struct Store {
    options: Options,
    inner: RwLock<StoreInner>,
    index: Box<dyn Index>,
    /// Incremented once per committed batch; 0 is reserved for direct writes.
    serial_counter: AtomicU64,
}

pub(crate) struct StoreInner {
    pub(crate) active: Option<Segment>,
    pub(crate) immutable: HashMap<u32, Segment>,
    /// Segment ids discovered at open, ascending. Recovery replays them in
    /// this order so later records overwrite earlier ones.
    file_ids: Vec<u32>,
}

impl Store {
    /// Opens the store in `options.dir_path`, creating the directory if
    /// needed and rebuilding the index from the segments found there.
    pub fn open(options: Options) -> Result<Self> {
        options.validate()?;
        fs::create_dir_all(&options.dir_path)?;

        let file_ids = discover_segment_ids(&options.dir_path)?;
        let mut active = None;
        let mut immutable = HashMap::new();
        for (i, &id) in file_ids.iter().enumerate() {
            let segment = Segment::open(&options.dir_path, id)?;
            if i + 1 == file_ids.len() {
                active = Some(segment);
            } else {
                immutable.insert(id, segment);
            }
        }

        let index: Box<dyn Index> = Box::new(BTreeIndex::new());
        let mut inner = StoreInner {
            active,
            immutable,
            file_ids,
        };
        let last_serial = recover(&mut inner, index.as_ref())?;

        tracing::info!(
            dir = %options.dir_path.display(),
            segments = inner.file_ids.len(),
            keys = index.len(),
            "opened store"
        );

        Ok(Self {
            options,
            inner: RwLock::new(inner),
            index,
            serial_counter: AtomicU64::new(last_serial),
        })
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&self, key: &[u8], value: impl Into<Bytes>) -> Result<()> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let mut inner = self.write_inner()?;

        let record = LogRecord::new(
            serial_record_key(key, NON_TXN_SERIAL),
            value.into(),
            RecordKind::Normal,
        );
        let pos = self.append_record(&mut inner, &record)?;

        if !self.index.put(Bytes::copy_from_slice(key), pos) {
            return Err(StoreError::IndexUpdateFailed);
        }
        Ok(())
    }

    /// Returns the latest value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Bytes> {
        let inner = self.read_inner()?;
        let pos = self.index.get(key).ok_or(StoreError::KeyNotFound)?;
        read_value_at(&inner, pos)
    }

    /// Deletes `key` by appending a tombstone.
    ///
    /// Returns [`StoreError::KeyNotFound`] when the key has no live value,
    /// so absent keys do not grow the log. (Batch-level deletes instead
    /// no-op on unknown keys; see [`WriteBatch::delete`].)
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let mut inner = self.write_inner()?;
        if self.index.get(key).is_none() {
            return Err(StoreError::KeyNotFound);
        }

        let record = LogRecord::new(
            serial_record_key(key, NON_TXN_SERIAL),
            Bytes::new(),
            RecordKind::Tombstone,
        );
        self.append_record(&mut inner, &record)?;
        self.index.delete(key);
        Ok(())
    }

    /// Fsyncs the active segment. Immutable segments were synced when they
    /// were rotated out.
    pub fn sync(&self) -> Result<()> {
        let inner = self.read_inner()?;
        if let Some(active) = inner.active.as_ref() {
            active.sync()?;
        }
        Ok(())
    }

    /// Flushes and drops every segment handle. Safe to call more than once;
    /// the store must not be used afterwards.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.write_inner()?;
        if let Some(active) = inner.active.as_ref() {
            active.sync()?;
        }
        inner.active = None;
        inner.immutable.clear();
        Ok(())
    }

    /// Creates an empty write batch bound to this store.
    pub fn new_batch(&self, options: BatchOptions) -> WriteBatch<'_> {
        WriteBatch::new(self, options)
    }

    /// Creates a range iterator over a snapshot of the current keys.
    pub fn iter(&self, options: IterOptions) -> StoreIter<'_> {
        StoreIter::new(self, options)
    }

    /// Number of live keys in the index.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends an encoded record to the active segment, rotating first when
    /// the record would overflow the configured segment size.
    ///
    /// Callers hold the exclusive engine lock, making this the single
    /// writer: the sequence of records on disk is the commit order.
    pub(crate) fn append_record(
        &self,
        inner: &mut StoreInner,
        record: &LogRecord,
    ) -> Result<Position> {
        if inner.active.is_none() {
            inner.active = Some(Segment::open(&self.options.dir_path, 0)?);
        }

        let (encoded, size) = encode_record(record);

        let limit = self.options.segment_size_limit as i64;
        let full = inner
            .active
            .as_ref()
            .is_some_and(|active| active.write_offset() + size > limit);
        if full {
            inner
                .active
                .as_ref()
                .expect("active segment exists")
                .sync()?;
            let old = inner.active.take().expect("active segment exists");
            let new_id = old.id() + 1;
            tracing::info!(old_segment = old.id(), new_segment = new_id, "rotated active segment");
            inner.immutable.insert(old.id(), old);
            inner.active = Some(Segment::open(&self.options.dir_path, new_id)?);
        }

        let active = inner.active.as_mut().expect("active segment exists");
        let offset = active.write_offset();
        active.append(&encoded)?;
        if self.options.sync_writes {
            active.sync()?;
        }

        Ok(Position {
            segment_id: active.id(),
            offset,
        })
    }

    pub(crate) fn index(&self) -> &dyn Index {
        self.index.as_ref()
    }

    /// Allocates the serial number for a committing batch.
    pub(crate) fn next_serial(&self) -> u64 {
        self.serial_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Largest serial handed out so far; 0 before the first batch commit.
    pub(crate) fn last_serial(&self) -> u64 {
        self.serial_counter.load(Ordering::SeqCst)
    }

    pub(crate) fn read_inner(&self) -> Result<RwLockReadGuard<'_, StoreInner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Internal("store lock poisoned"))
    }

    pub(crate) fn write_inner(&self) -> Result<RwLockWriteGuard<'_, StoreInner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Internal("store lock poisoned"))
    }
}

/// Flush the active segment when the store goes out of scope.
impl Drop for Store {
    fn drop(&mut self) {
        if let Err(error) = self.sync() {
            tracing::error!(%error, "failed to flush active segment on drop");
        }
    }
}

/// Resolves a position to the value it points at.
///
/// The tombstone check is defense in depth: the index never points at one.
pub(crate) fn read_value_at(inner: &StoreInner, pos: Position) -> Result<Bytes> {
    let segment = match inner.active.as_ref().filter(|s| s.id() == pos.segment_id) {
        Some(active) => active,
        None => inner
            .immutable
            .get(&pos.segment_id)
            .ok_or(StoreError::DataFileNotFound(pos.segment_id))?,
    };

    let (record, _) = segment.read_record(pos.offset)?;
    if record.kind == RecordKind::Tombstone {
        return Err(StoreError::KeyNotFound);
    }
    Ok(record.value)
}

/// Lists the segment ids present in `dir`, ascending.
fn discover_segment_ids(dir: &Path) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name.strip_suffix(SEGMENT_FILE_SUFFIX) else {
            continue;
        };
        match stem.parse::<u32>() {
            Ok(id) => ids.push(id),
            Err(_) => tracing::debug!(file = name, "skipping non-segment file"),
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// A batched record seen during replay, held until its sentinel arrives.
struct PendingRecord {
    kind: RecordKind,
    key: Bytes,
    pos: Position,
}

/// Rebuilds the index by replaying every segment in id order.
///
/// Returns the largest committed batch serial observed. Batched records are
/// buffered per serial and applied only when the matching `TxnFinished`
/// sentinel is found; buffers with no sentinel belong to batches that never
/// committed and are dropped. A torn tail in the active segment is truncated
/// away; corruption anywhere in an immutable segment fails the open.
fn recover(inner: &mut StoreInner, index: &dyn Index) -> Result<u64> {
    let active_id = inner.active.as_ref().map(Segment::id);
    let mut pending: HashMap<u64, Vec<PendingRecord>> = HashMap::new();
    let mut last_serial = 0u64;

    for &id in &inner.file_ids {
        let is_active = Some(id) == active_id;
        let segment = if is_active {
            inner.active.as_ref().expect("active segment exists")
        } else {
            &inner.immutable[&id]
        };

        let mut offset = 0i64;
        let corrupt = loop {
            let (record, size) = match segment.read_record(offset) {
                Ok(decoded) => decoded,
                Err(StoreError::UnexpectedEof) => break false,
                Err(StoreError::CorruptRecord) => break true,
                Err(error) => return Err(error),
            };

            let pos = Position {
                segment_id: id,
                offset,
            };
            let Some((serial, key)) = parse_record_key(&record.key) else {
                break true;
            };

            match record.kind {
                RecordKind::TxnFinished => {
                    for entry in pending.remove(&serial).unwrap_or_default() {
                        apply(index, entry.kind, entry.key, entry.pos)?;
                    }
                    last_serial = last_serial.max(serial);
                }
                kind if serial == NON_TXN_SERIAL => apply(index, kind, key, pos)?,
                kind => pending.entry(serial).or_default().push(PendingRecord {
                    kind,
                    key,
                    pos,
                }),
            }

            offset += size;
        };

        if corrupt && !is_active {
            return Err(StoreError::Corruption {
                segment_id: id,
                offset,
            });
        }

        if is_active {
            // The prefix up to `offset` is authoritative. Anything after it
            // is a torn tail or preallocated padding; cut it off so the
            // append-mode descriptor continues from the last valid record.
            let active = inner.active.as_mut().expect("active segment exists");
            if offset < active.write_offset() {
                tracing::warn!(
                    segment = id,
                    valid_up_to = offset,
                    file_size = active.write_offset(),
                    "truncating invalid tail of active segment"
                );
                active.truncate(offset)?;
            }
        }
    }

    Ok(last_serial)
}

/// Applies one recovered record to the index.
fn apply(index: &dyn Index, kind: RecordKind, key: Bytes, pos: Position) -> Result<()> {
    match kind {
        RecordKind::Normal => {
            if !index.put(key, pos) {
                return Err(StoreError::IndexUpdateFailed);
            }
        }
        RecordKind::Tombstone => {
            index.delete(&key);
        }
        RecordKind::TxnFinished => {}
    }
    Ok(())
}
