//! # memtable
//!
//! An in-memory, sorted, mutable write buffer for `u64` keys and values.
//!
//! The memtable is the first point of contact for every write. It buffers
//! recent puts and deletes in a sorted structure before they are flushed to
//! an immutable on-disk sorted run.
//!
//! ## Key properties
//! - **Sorted order**: entries are always in ascending key order (required
//!   for flush).
//! - **Bounded capacity**: an absolute cap on the number of distinct keys,
//!   set at construction. `put` of a *new* key past capacity fails with
//!   [`MemtableError::MemtableFull`]; updating an existing key never does,
//!   since the key count does not grow.
//! - **Tombstones**: deletes are recorded as ordinary entries whose value is
//!   [`pagefile::TOMBSTONE`] — the memtable itself does not interpret them
//!   specially; that's the engine's job.
//!
//! A red-black tree is the textbook choice for a balanced ordered index, but
//! only its externally observable behavior — ordered iteration, point
//! lookup, and bounded capacity — is contractual. A `BTreeMap` satisfies all
//! of it.
//!
//! ## Example
//! ```rust
//! use memtable::Memtable;
//!
//! let mut m = Memtable::new(16);
//! m.put(1, 100).unwrap();
//! assert_eq!(m.get(1), Some(100));
//! ```

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised by memtable operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemtableError {
    /// `put` was called with a new key while the memtable already holds
    /// `capacity` distinct keys.
    #[error("memtable is full (capacity {capacity})")]
    MemtableFull {
        /// The configured capacity that was exceeded.
        capacity: usize,
    },
}

/// An ordered, in-memory write buffer bounded by a fixed number of distinct
/// keys.
#[derive(Debug)]
pub struct Memtable {
    map: BTreeMap<u64, u64>,
    capacity: usize,
}

impl Memtable {
    /// Creates an empty memtable that can hold at most `capacity` distinct
    /// keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: BTreeMap::new(),
            capacity,
        }
    }

    /// Inserts or updates `key` with `value`.
    ///
    /// Updating an existing key always succeeds, since it does not grow the
    /// key count. Inserting a new key fails with
    /// [`MemtableError::MemtableFull`] once the memtable already holds
    /// `capacity` distinct keys.
    pub fn put(&mut self, key: u64, value: u64) -> Result<(), MemtableError> {
        if !self.map.contains_key(&key) && self.map.len() >= self.capacity {
            return Err(MemtableError::MemtableFull {
                capacity: self.capacity,
            });
        }
        self.map.insert(key, value);
        Ok(())
    }

    /// Returns the value for `key`, if present. Does not distinguish a live
    /// value from a tombstone — callers compare against
    /// [`pagefile::TOMBSTONE`] themselves.
    #[must_use]
    pub fn get(&self, key: u64) -> Option<u64> {
        self.map.get(&key).copied()
    }

    /// Returns all entries with `lo <= key <= hi`, in ascending key order.
    #[must_use]
    pub fn scan(&self, lo: u64, hi: u64) -> Vec<(u64, u64)> {
        self.map.range(lo..=hi).map(|(&k, &v)| (k, v)).collect()
    }

    /// Returns every entry in ascending key order.
    #[must_use]
    pub fn scan_all(&self) -> Vec<(u64, u64)> {
        self.map.iter().map(|(&k, &v)| (k, v)).collect()
    }

    /// Removes every entry, resetting the memtable to empty.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Number of distinct keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// `true` if the memtable holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The capacity configured at construction.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` if the memtable holds `capacity` distinct keys and a new key
    /// would be rejected.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.map.len() >= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let mut m = Memtable::new(4);
        m.put(10, 100).unwrap();
        assert_eq!(m.get(10), Some(100));
    }

    #[test]
    fn updating_existing_key_never_fails_even_at_capacity() {
        let mut m = Memtable::new(1);
        m.put(1, 10).unwrap();
        assert!(m.is_full());
        m.put(1, 20).unwrap();
        assert_eq!(m.get(1), Some(20));
    }

    #[test]
    fn new_key_past_capacity_fails() {
        let mut m = Memtable::new(1);
        m.put(1, 10).unwrap();
        let err = m.put(2, 20).unwrap_err();
        assert_eq!(err, MemtableError::MemtableFull { capacity: 1 });
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn scan_is_ascending_and_inclusive_both_ends() {
        let mut m = Memtable::new(8);
        for k in [5u64, 1, 9, 3, 7] {
            m.put(k, k * 10).unwrap();
        }
        assert_eq!(m.scan(3, 7), vec![(3, 30), (5, 50), (7, 70)]);
    }

    #[test]
    fn scan_all_returns_every_entry_sorted() {
        let mut m = Memtable::new(8);
        for k in [5u64, 1, 9, 3] {
            m.put(k, k).unwrap();
        }
        assert_eq!(m.scan_all(), vec![(1, 1), (3, 3), (5, 5), (9, 9)]);
    }

    #[test]
    fn clear_empties_and_resets_capacity_headroom() {
        let mut m = Memtable::new(1);
        m.put(1, 1).unwrap();
        m.clear();
        assert!(m.is_empty());
        m.put(2, 2).unwrap();
        assert_eq!(m.get(2), Some(2));
    }

    #[test]
    fn tombstone_is_stored_as_an_ordinary_value() {
        let mut m = Memtable::new(4);
        m.put(1, pagefile::TOMBSTONE).unwrap();
        assert_eq!(m.get(1), Some(pagefile::TOMBSTONE));
    }
}
