//! In-memory ordered index from logical keys to record positions.
//!
//! The index is the only structure consulted on reads: it maps each live key
//! to the [`Position`] of the record holding its latest value. The engine
//! owns it behind the [`Index`] trait so alternative implementations can be
//! substituted; [`BTreeIndex`] is the default.
//!
//! # Invariants
//!
//! - An entry always points at a `Normal` record; tombstones remove entries.
//! - Cursors snapshot the key/position list at construction, so traversal
//!   needs no lock and concurrent writers never invalidate an open cursor.

use std::collections::BTreeMap;
use std::sync::RwLock;

use bytes::Bytes;

use crate::record::Position;

/// Ordered byte-key → position map, safe to share across threads.
pub trait Index: Send + Sync {
    /// Stores `pos` under `key`, replacing any prior mapping.
    /// Returns `false` only if the index rejected the update.
    fn put(&self, key: Bytes, pos: Position) -> bool;

    /// Returns the position stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Option<Position>;

    /// Removes the mapping for `key`, returning whether one existed.
    fn delete(&self, key: &[u8]) -> bool;

    /// Number of live keys.
    fn len(&self) -> usize;

    /// Snapshots the current entries into a cursor, ascending by key, or
    /// descending when `reverse` is set.
    fn iter(&self, reverse: bool) -> IndexIter;
}

/// [`Index`] backed by a [`BTreeMap`] under a reader-writer lock.
#[derive(Debug, Default)]
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Bytes, Position>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Index for BTreeIndex {
    fn put(&self, key: Bytes, pos: Position) -> bool {
        let Ok(mut tree) = self.tree.write() else {
            return false;
        };
        tree.insert(key, pos);
        true
    }

    fn get(&self, key: &[u8]) -> Option<Position> {
        let tree = self.tree.read().ok()?;
        tree.get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> bool {
        let Ok(mut tree) = self.tree.write() else {
            return false;
        };
        tree.remove(key).is_some()
    }

    fn len(&self) -> usize {
        self.tree.read().map_or(0, |tree| tree.len())
    }

    fn iter(&self, reverse: bool) -> IndexIter {
        let mut items: Vec<(Bytes, Position)> = self
            .tree
            .read()
            .map_or_else(|_| Vec::new(), |tree| tree.iter().map(|(k, p)| (k.clone(), *p)).collect());
        if reverse {
            items.reverse();
        }
        IndexIter {
            items,
            cursor: 0,
            reverse,
        }
    }
}

/// Snapshot cursor over index entries.
///
/// In forward order entries ascend by key; in reverse they descend.
/// `seek` lands on the first entry ≥ the key (forward) or ≤ it (reverse).
pub struct IndexIter {
    items: Vec<(Bytes, Position)>,
    cursor: usize,
    reverse: bool,
}

impl IndexIter {
    /// Moves back to the first entry.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Positions the cursor at the first entry ≥ `key` in forward order,
    /// or the first entry ≤ `key` in reverse order.
    pub fn seek(&mut self, key: &[u8]) {
        self.cursor = if self.reverse {
            self.items.partition_point(|(k, _)| k.as_ref() > key)
        } else {
            self.items.partition_point(|(k, _)| k.as_ref() < key)
        };
    }

    /// Advances to the next entry.
    pub fn next(&mut self) {
        self.cursor += 1;
    }

    /// Whether the cursor currently points at an entry.
    pub fn valid(&self) -> bool {
        self.cursor < self.items.len()
    }

    /// Key of the current entry. Only meaningful while [`valid`](Self::valid).
    pub fn key(&self) -> &Bytes {
        &self.items[self.cursor].0
    }

    /// Position of the current entry. Only meaningful while [`valid`](Self::valid).
    pub fn value(&self) -> Position {
        self.items[self.cursor].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(segment_id: u32, offset: i64) -> Position {
        Position { segment_id, offset }
    }

    #[test]
    fn put_get_overwrite() {
        let index = BTreeIndex::new();
        assert!(index.put(Bytes::from("a"), pos(1, 0)));
        assert_eq!(index.get(b"a"), Some(pos(1, 0)));

        assert!(index.put(Bytes::from("a"), pos(2, 64)));
        assert_eq!(index.get(b"a"), Some(pos(2, 64)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn delete_reports_existence() {
        let index = BTreeIndex::new();
        index.put(Bytes::from("a"), pos(1, 0));

        assert!(index.delete(b"a"));
        assert!(!index.delete(b"a"));
        assert_eq!(index.get(b"a"), None);
    }

    #[test]
    fn cursor_walks_keys_in_order() {
        let index = BTreeIndex::new();
        for key in ["banana", "apple", "cherry"] {
            index.put(Bytes::from(key), pos(0, 0));
        }

        let mut iter = index.iter(false);
        let mut keys = Vec::new();
        while iter.valid() {
            keys.push(iter.key().clone());
            iter.next();
        }
        assert_eq!(keys, vec!["apple", "banana", "cherry"]);

        let mut iter = index.iter(true);
        let mut keys = Vec::new();
        while iter.valid() {
            keys.push(iter.key().clone());
            iter.next();
        }
        assert_eq!(keys, vec!["cherry", "banana", "apple"]);
    }

    #[test]
    fn seek_forward_finds_first_at_or_after() {
        let index = BTreeIndex::new();
        for key in ["a", "c", "e"] {
            index.put(Bytes::from(key), pos(0, 0));
        }

        let mut iter = index.iter(false);
        iter.seek(b"b");
        assert!(iter.valid());
        assert_eq!(iter.key().as_ref(), b"c");

        iter.seek(b"e");
        assert_eq!(iter.key().as_ref(), b"e");

        iter.seek(b"f");
        assert!(!iter.valid());
    }

    #[test]
    fn seek_reverse_finds_first_at_or_before() {
        let index = BTreeIndex::new();
        for key in ["a", "c", "e"] {
            index.put(Bytes::from(key), pos(0, 0));
        }

        let mut iter = index.iter(true);
        iter.seek(b"d");
        assert!(iter.valid());
        assert_eq!(iter.key().as_ref(), b"c");

        iter.seek(b"0");
        assert!(!iter.valid());
    }

    #[test]
    fn cursor_is_a_snapshot() {
        let index = BTreeIndex::new();
        index.put(Bytes::from("a"), pos(0, 0));

        let mut iter = index.iter(false);
        index.delete(b"a");
        index.put(Bytes::from("z"), pos(0, 0));

        assert!(iter.valid());
        assert_eq!(iter.key().as_ref(), b"a");
        iter.next();
        assert!(!iter.valid());
    }
}
