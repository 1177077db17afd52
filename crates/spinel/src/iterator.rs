//! Range iteration over the store.
//!
//! A [`StoreIter`] walks a snapshot of the index, optionally restricted to a
//! key prefix and optionally in descending order. Keys come straight from
//! the snapshot; values are resolved through the engine on demand, so a
//! cursor stays cheap until `value()` is called.

use bytes::Bytes;

use crate::error::Result;
use crate::index::IndexIter;
use crate::options::IterOptions;
use crate::store::{Store, read_value_at};

/// Snapshot cursor over the store's keys.
///
/// Concurrent writes after construction are not observed: a deleted key
/// still resolves through its old record (snapshot semantics).
pub struct StoreIter<'a> {
    store: &'a Store,
    cursor: IndexIter,
    options: IterOptions,
}

impl<'a> StoreIter<'a> {
    pub(crate) fn new(store: &'a Store, options: IterOptions) -> Self {
        let cursor = store.index().iter(options.reverse);
        let mut iter = Self {
            store,
            cursor,
            options,
        };
        iter.rewind();
        iter
    }

    /// Moves back to the first key within the prefix.
    pub fn rewind(&mut self) {
        if self.options.prefix.is_empty() {
            self.cursor.rewind();
            return;
        }
        if self.options.reverse {
            // Descending: start from the last key still inside the prefix
            // range, i.e. just below the prefix's lexicographic successor.
            match prefix_successor(&self.options.prefix) {
                Some(upper) => self.cursor.seek(&upper),
                None => self.cursor.rewind(),
            }
        } else {
            self.cursor.seek(&self.options.prefix);
        }
        self.skip_to_prefix();
    }

    /// Positions the cursor at the first key ≥ `key` (forward) or ≤ `key`
    /// (reverse), still honoring the prefix.
    pub fn seek(&mut self, key: &[u8]) {
        self.cursor.seek(key);
        self.skip_to_prefix();
    }

    /// Advances to the next key within the prefix.
    pub fn next(&mut self) {
        self.cursor.next();
        self.skip_to_prefix();
    }

    /// Whether the cursor points at an entry.
    pub fn valid(&self) -> bool {
        self.cursor.valid()
    }

    /// Current key. Only meaningful while [`valid`](Self::valid).
    pub fn key(&self) -> &Bytes {
        self.cursor.key()
    }

    /// Resolves the current key's value through the engine.
    pub fn value(&self) -> Result<Bytes> {
        let pos = self.cursor.value();
        let inner = self.store.read_inner()?;
        read_value_at(&inner, pos)
    }

    /// Skips entries that do not begin with the configured prefix.
    fn skip_to_prefix(&mut self) {
        let prefix = &self.options.prefix;
        if prefix.is_empty() {
            return;
        }
        while self.cursor.valid() && !self.cursor.key().starts_with(prefix) {
            self.cursor.next();
        }
    }
}

/// Smallest byte string greater than every string starting with `prefix`,
/// or `None` when the prefix is all `0xff` and no such bound exists.
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_increments_last_byte() {
        assert_eq!(prefix_successor(b"abc"), Some(b"abd".to_vec()));
    }

    #[test]
    fn successor_carries_past_ff() {
        assert_eq!(prefix_successor(&[b'a', 0xff, 0xff]), Some(vec![b'b']));
    }

    #[test]
    fn successor_of_all_ff_is_unbounded() {
        assert_eq!(prefix_successor(&[0xff, 0xff]), None);
    }
}
