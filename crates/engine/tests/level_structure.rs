//! Scenario (d) from spec.md §8: with `tiers = 4` and a 2-element memtable,
//! verifies that flushes and cascading compaction produce the exact file
//! layout the spec names, and that every key stays reachable throughout.

use engine::{KvStore, Options};
use sstable::Serialization;

fn opts(dir: &std::path::Path) -> Options {
    Options {
        dir: dir.to_path_buf(),
        memory_buffer_elements: 2,
        tiers: 4,
        serialization: Serialization::FlatSorted,
        ..Options::default()
    }
}

fn data_file(dir: &std::path::Path, level: u32, run: u32, intermediate: u32) -> std::path::PathBuf {
    dir.join("db")
        .join(format!("db.DATA.L{}.R{}.I{}", level, run, intermediate))
}

fn filter_file(dir: &std::path::Path, level: u32, run: u32, intermediate: u32) -> std::path::PathBuf {
    dir.join("db")
        .join(format!("db.FILTER.L{}.R{}.I{}", level, run, intermediate))
}

#[test]
fn level_structure_matches_spec_scenario_d() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = KvStore::open("db", opts(dir.path())).unwrap();

    // 3 puts: memtable (capacity 2) overflows on the 3rd, flushing 2 keys to
    // L0.R0.I0.
    for i in 0u64..3 {
        store.put(i, i * 10).unwrap();
    }
    assert!(data_file(dir.path(), 0, 0, 0).exists());
    assert!(filter_file(dir.path(), 0, 0, 0).exists());

    // 2 more puts (total 5): another overflow flushes L0.R1.I0.
    for i in 3u64..5 {
        store.put(i, i * 10).unwrap();
    }
    assert!(data_file(dir.path(), 0, 1, 0).exists());

    // 4 more puts (total 9): the third L0 flush overflows the tier-4 budget
    // (tiers - 1 = 3 runs), cascading all of L0 into a new L1 run. With
    // 9 pairs and a 255-pair leaf size, the merge fits in L1.R0.I0.
    for i in 5u64..9 {
        store.put(i, i * 10).unwrap();
    }

    assert!(!data_file(dir.path(), 0, 0, 0).exists());
    assert!(!data_file(dir.path(), 0, 1, 0).exists());
    assert!(!data_file(dir.path(), 0, 2, 0).exists());
    assert!(data_file(dir.path(), 1, 0, 0).exists());

    for i in 0u64..9 {
        assert_eq!(store.get(i).unwrap(), Some(i * 10), "key {i} unreachable");
    }
}

#[test]
fn repeated_rounds_cascade_to_level_two() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = KvStore::open("db", opts(dir.path())).unwrap();

    // 33 puts total: three rounds of 9 plus the initial 9 drains L0 and L1
    // down into a single L2 run, per spec.md §8 scenario (d).
    for i in 0u64..33 {
        store.put(i, i * 10).unwrap();
    }

    assert_eq!(0, count_runs_remaining(dir.path(), "db", 0));
    for i in 0u64..33 {
        assert_eq!(store.get(i).unwrap(), Some(i * 10), "key {i} unreachable");
    }
}

fn count_runs_remaining(dir: &std::path::Path, name: &str, level: u32) -> usize {
    let dbdir = dir.join(name);
    let prefix = format!("{}.DATA.L{}.", name, level);
    std::fs::read_dir(&dbdir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with(&prefix))
                .unwrap_or(false)
        })
        .count()
}
