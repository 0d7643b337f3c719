//! # sstable
//!
//! Immutable, on-disk sorted-run files for the storage engine, plus the
//! k-way merge primitive ([`MinHeap`]) that both compaction and multi-run
//! scans are built on.
//!
//! Two on-disk formats share one interface — `flush`, `get_from_file`,
//! `scan_in_file`, `drain`, `get_minimum`/`get_maximum` — selected by
//! [`Serialization`], the choice an engine makes once at `Open` and applies
//! uniformly to every run it writes:
//!
//! - [`Serialization::FlatSorted`] ([`flat`]): a packed, binary-searchable
//!   array of pairs. Cheap to flush, O(log n) probes.
//! - [`Serialization::BTree`] ([`btree`]): a bottom-up on-disk B-tree with
//!   leaf pages chained for sequential scans. Slightly more expensive to
//!   build, but probes touch fewer pages for very large runs.
//!
//! Every page access — header, pair array, B-tree node — is routed through
//! the shared [`bufpool::BufPool`] so repeated probes within a hot key range
//! are served from cache instead of re-reading from disk.

pub mod btree;
pub mod flat;
mod pagecache;

mod minheap;
pub use minheap::{Entry as MinHeapEntry, MinHeap};

use bufpool::BufPool;
use std::io;
use std::path::Path;

/// Selects which on-disk sorted-run format an engine reads and writes.
///
/// Chosen once, at `Open`, via [`engine`](../engine/index.html)'s
/// `Options::serialization` and applied to every run for the lifetime of the
/// database — the two formats are never mixed within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serialization {
    /// Packed sorted array, probed via binary search.
    FlatSorted,
    /// Bottom-up on-disk B-tree with chained leaves.
    BTree,
}

/// Writes a sorted-run data file from an already key-sorted slice of pairs,
/// in the format selected by `serialization`.
pub fn flush(serialization: Serialization, path: &Path, pairs: &[(u64, u64)]) -> io::Result<()> {
    match serialization {
        Serialization::FlatSorted => flat::flush(path, pairs),
        Serialization::BTree => btree::flush(path, pairs),
    }
}

/// Point lookup. `None` if `key` is outside the file's `[min, max]` range or
/// not present.
pub fn get_from_file(
    serialization: Serialization,
    path: &Path,
    key: u64,
    pool: &mut BufPool,
) -> io::Result<Option<u64>> {
    match serialization {
        Serialization::FlatSorted => flat::get_from_file(path, key, pool),
        Serialization::BTree => btree::get_from_file(path, key, pool),
    }
}

/// Range scan `[lo, hi]` inclusive, ascending key order.
pub fn scan_in_file(
    serialization: Serialization,
    path: &Path,
    lo: u64,
    hi: u64,
    pool: &mut BufPool,
) -> io::Result<Vec<(u64, u64)>> {
    match serialization {
        Serialization::FlatSorted => flat::scan_in_file(path, lo, hi, pool),
        Serialization::BTree => btree::scan_in_file(path, lo, hi, pool),
    }
}

/// Full in-order read of every pair in the file. Used by compaction to
/// stream a run's files through the merge.
pub fn drain(serialization: Serialization, path: &Path, pool: &mut BufPool) -> io::Result<Vec<(u64, u64)>> {
    match serialization {
        Serialization::FlatSorted => flat::drain(path, pool),
        Serialization::BTree => btree::drain(path, pool),
    }
}

/// The file's minimum key, from its header. Used by manifest recovery to
/// reconstruct `FileMetadata` for orphaned/undiscovered files.
pub fn get_minimum(serialization: Serialization, path: &Path, pool: &mut BufPool) -> io::Result<u64> {
    match serialization {
        Serialization::FlatSorted => flat::get_minimum(path, pool),
        Serialization::BTree => btree::get_minimum(path, pool),
    }
}

/// The file's maximum key, from its header.
pub fn get_maximum(serialization: Serialization, path: &Path, pool: &mut BufPool) -> io::Result<u64> {
    match serialization {
        Serialization::FlatSorted => flat::get_maximum(path, pool),
        Serialization::BTree => btree::get_maximum(path, pool),
    }
}

/// Removes a sorted-run data file from disk. Both formats share the same
/// deletion semantics — there is no per-format cleanup beyond unlinking the
/// file — so this is not dispatched through `Serialization`.
pub fn delete_file(path: &Path) -> io::Result<()> {
    std::fs::remove_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> BufPool {
        BufPool::new(64, |id| id.page)
    }

    #[test]
    fn dispatch_matches_format_for_both_variants() {
        for serialization in [Serialization::FlatSorted, Serialization::BTree] {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("t.DATA.L0.R0.I0");
            let pairs: Vec<(u64, u64)> = (0..300).map(|i| (i, i * 3)).collect();
            flush(serialization, &path, &pairs).unwrap();

            let mut pool = pool();
            assert_eq!(get_from_file(serialization, &path, 150, &mut pool).unwrap(), Some(450));
            assert_eq!(get_minimum(serialization, &path, &mut pool).unwrap(), 0);
            assert_eq!(get_maximum(serialization, &path, &mut pool).unwrap(), 299);
            assert_eq!(drain(serialization, &path, &mut pool).unwrap(), pairs);

            delete_file(&path).unwrap();
            assert!(!path.exists());
        }
    }
}
