//! Scenario (c) from spec.md §8: a 10k-key round trip through a small
//! memtable, exercising every flush and compaction the default tier budget
//! triggers along the way.

use engine::{KvStore, Options};
use sstable::Serialization;

#[test]
fn ten_thousand_keys_round_trip_with_small_memtable() {
    let dir = tempfile::tempdir().unwrap();
    let options = Options {
        dir: dir.path().to_path_buf(),
        memory_buffer_elements: 1000,
        serialization: Serialization::FlatSorted,
        ..Options::default()
    };
    let mut store = KvStore::open("db", options).unwrap();

    for i in 0u64..10_000 {
        store.put(i, 2 * i).unwrap();
    }
    for i in 0u64..10_000 {
        assert_eq!(store.get(i).unwrap(), Some(2 * i));
    }

    for i in 0u64..10_000 {
        store.delete(i).unwrap();
    }
    for i in 0u64..10_000 {
        assert_eq!(store.get(i).unwrap(), None);
    }
}

#[test]
fn ten_thousand_keys_round_trip_with_btree_serialization() {
    let dir = tempfile::tempdir().unwrap();
    let options = Options {
        dir: dir.path().to_path_buf(),
        memory_buffer_elements: 500,
        serialization: Serialization::BTree,
        ..Options::default()
    };
    let mut store = KvStore::open("db", options).unwrap();

    for i in 0u64..10_000 {
        store.put(i, 2 * i).unwrap();
    }
    for i in (0u64..10_000).step_by(7) {
        assert_eq!(store.get(i).unwrap(), Some(2 * i));
    }

    let scanned = store.scan(100, 200).unwrap();
    let expected: Vec<(u64, u64)> = (100..=200).map(|i| (i, 2 * i)).collect();
    assert_eq!(scanned, expected);
}
