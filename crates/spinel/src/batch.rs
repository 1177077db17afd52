//! Atomic multi-key write batches.
//!
//! A batch stages puts and deletes in memory, then commits them all at once
//! under a fresh serial number. Every staged record is appended with the
//! serial varint-prefixed to its key, followed by one `TxnFinished` sentinel
//! carrying the same serial. Recovery only applies batched records whose
//! sentinel made it to disk, so a crash mid-commit leaves no partial
//! effects, with no undo log needed.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::{BufMut, Bytes, BytesMut};
use integer_encoding::VarInt;

use crate::error::{Result, StoreError};
use crate::options::BatchOptions;
use crate::record::{LogRecord, Position, RecordKind};
use crate::store::Store;

/// Serial reserved for direct (non-batched) puts and deletes.
pub(crate) const NON_TXN_SERIAL: u64 = 0;

/// Key of the commit sentinel. Its content never matters; recovery keys off
/// the record kind and the serial prefix.
const TXN_FIN_KEY: &[u8] = b"txn-finished";

/// A staged set of writes that commits atomically.
///
/// Batches are independent of each other: each has its own lock over its
/// staging map, and the engine lock is only taken inside [`commit`]
/// (always after the batch lock, so two batches can never deadlock).
///
/// [`commit`]: WriteBatch::commit
pub struct WriteBatch<'a> {
    store: &'a Store,
    options: BatchOptions,
    pending: Mutex<HashMap<Bytes, LogRecord>>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(store: &'a Store, options: BatchOptions) -> Self {
        Self {
            store,
            options,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Stages a put. Overwrites any earlier staged operation on the key.
    pub fn put(&self, key: &[u8], value: impl Into<Bytes>) -> Result<()> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let mut pending = self.lock_pending()?;

        let key = Bytes::copy_from_slice(key);
        let record = LogRecord::new(key.clone(), value.into(), RecordKind::Normal);
        pending.insert(key, record);
        Ok(())
    }

    /// Stages a delete.
    ///
    /// A delete of a key that is neither staged nor present in the store is
    /// a no-op rather than an error, so batches never grow the log for keys
    /// that were never written.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let mut pending = self.lock_pending()?;

        match pending.get(key) {
            Some(record) if record.kind == RecordKind::Tombstone => return Ok(()),
            Some(_) => {}
            None => {
                if self.store.index().get(key).is_none() {
                    return Ok(());
                }
            }
        }

        let key = Bytes::copy_from_slice(key);
        let record = LogRecord::new(key.clone(), Bytes::new(), RecordKind::Tombstone);
        pending.insert(key, record);
        Ok(())
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.pending.lock().map_or(0, |pending| pending.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically applies every staged operation.
    ///
    /// The staged records and the closing sentinel are appended under the
    /// engine's exclusive lock; the index is only updated after all of them
    /// (and the optional fsync) succeeded. On error the staging map is left
    /// intact and no effect is visible; recovery discards the partial
    /// records because their sentinel is missing.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.lock_pending()?;
        if pending.is_empty() {
            return Err(StoreError::EmptyBatch);
        }
        if pending.len() > self.options.max_batch_num as usize {
            return Err(StoreError::BatchTooLarge(self.options.max_batch_num));
        }

        let mut inner = self.store.write_inner()?;
        let serial = self.store.next_serial();

        let mut positions: HashMap<Bytes, Position> = HashMap::with_capacity(pending.len());
        for record in pending.values() {
            let encoded = LogRecord::new(
                serial_record_key(&record.key, serial),
                record.value.clone(),
                record.kind,
            );
            let pos = self.store.append_record(&mut inner, &encoded)?;
            positions.insert(record.key.clone(), pos);
        }

        let sentinel = LogRecord::new(
            serial_record_key(TXN_FIN_KEY, serial),
            Bytes::new(),
            RecordKind::TxnFinished,
        );
        self.store.append_record(&mut inner, &sentinel)?;

        if self.options.sync_on_commit {
            if let Some(active) = inner.active.as_ref() {
                active.sync()?;
            }
        }

        for record in pending.values() {
            match record.kind {
                RecordKind::Normal => {
                    let pos = positions[&record.key];
                    if !self.store.index().put(record.key.clone(), pos) {
                        return Err(StoreError::IndexUpdateFailed);
                    }
                }
                RecordKind::Tombstone => {
                    self.store.index().delete(&record.key);
                }
                RecordKind::TxnFinished => {}
            }
        }

        pending.clear();
        Ok(())
    }

    fn lock_pending(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Bytes, LogRecord>>> {
        self.pending
            .lock()
            .map_err(|_| StoreError::Internal("batch lock poisoned"))
    }
}

/// Prefixes `key` with `serial` as an unsigned varint.
///
/// Every on-disk key carries this prefix; serial 0 marks direct writes. The
/// encoding is unambiguous because the varint is self-delimiting.
pub(crate) fn serial_record_key(key: &[u8], serial: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(serial.required_space() + key.len());
    buf.put_slice(&serial.encode_var_vec());
    buf.put_slice(key);
    buf.freeze()
}

/// Splits an on-disk key into its serial and the logical key.
pub(crate) fn parse_record_key(key: &Bytes) -> Option<(u64, Bytes)> {
    let (serial, n) = u64::decode_var(key)?;
    Some((serial, key.slice(n..)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_key_roundtrip() {
        let encoded = serial_record_key(b"key-with-serial", 987_654_321);
        let (serial, key) = parse_record_key(&encoded).unwrap();
        assert_eq!(serial, 987_654_321);
        assert_eq!(key.as_ref(), b"key-with-serial");
    }

    #[test]
    fn non_txn_serial_is_single_zero_byte() {
        let encoded = serial_record_key(b"k", NON_TXN_SERIAL);
        assert_eq!(encoded.as_ref(), &[0x00, b'k'][..]);
    }

    #[test]
    fn parse_rejects_unterminated_varint() {
        let key = Bytes::from_static(&[0xFF, 0xFF]);
        assert!(parse_record_key(&key).is_none());
    }
}
