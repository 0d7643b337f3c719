//! The public façade: `Options`, `StoreError`, and `KvStore` itself.
//!
//! Grounded in the teacher's `Engine` (construction/lifecycle, `Drop`,
//! `Debug`) and `cli::main`'s configuration pattern, generalized to
//! spec.md §4.11: resolve `<dir>/<name>` as the db directory, take the lock
//! file, build the buffer pool / manifest / per-level objects, and expose
//! `Put`/`Get`/`Scan`/`Delete` over the memtable and the per-level runs.

use crate::level::{compact_cascading, force_compact, LSMLevel};
use crate::manifest::Manifest;
use crate::merge::k_way_merge_streams;
use crate::run::LSMRun;
use bufpool::{BufPool, PageId};
use memtable::{Memtable, MemtableError};
use pagefile::{DbNaming, TOMBSTONE};
use sstable::Serialization;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use thiserror::Error;

/// Default number of runs a level holds before compaction merges it into
/// the next level down (spec.md §4.11: "the source uses `tiers = 4`").
pub const DEFAULT_TIERS: u8 = 4;

/// Errors surfaced directly to callers (spec.md §6-§7). Internal errors
/// (`MemtableFull`, filter false positives, sstable probe misses) are
/// caught and converted to structural actions before ever reaching here.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An operation was attempted on a `KvStore` after `close()`.
    #[error("database is closed")]
    DatabaseClosed,
    /// `open()` found another instance's lock file already present.
    #[error("database is already in use")]
    DatabaseInUse,
    /// The database directory could not be created or opened.
    #[error("failed to open database: {0}")]
    FailedToOpen(#[source] std::io::Error),
    /// `Put` was called with the reserved tombstone value.
    #[error("the reserved tombstone value cannot be used as a put value")]
    OnlyTheDatabaseCanUseFunnyValues,
    /// A file's page-0 header failed to validate (bad magic or type tag).
    #[error("corrupt file: {0}")]
    Corrupt(String),
    /// Any other I/O failure reading or writing a data, filter, or manifest
    /// file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Options recognized by [`KvStore::open`] (spec.md §6).
#[derive(Debug, Clone)]
pub struct Options {
    /// Parent directory for the database directory; the db lives at
    /// `dir.join(name)`.
    pub dir: PathBuf,
    /// If `true`, wipe any existing db directory before opening.
    pub overwrite: bool,
    /// Memtable capacity, in distinct keys.
    pub memory_buffer_elements: usize,
    /// Buffer-pool max page count.
    pub buffer_pages_maximum: usize,
    /// On-disk sorted-run format used for every run in this database.
    pub serialization: Serialization,
    /// Max runs per level before compaction triggers (default 4).
    pub tiers: u8,
    /// Whether compaction runs automatically after a flush overflows a
    /// level's tier budget (default `true`).
    pub compaction: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            overwrite: false,
            memory_buffer_elements: 1000,
            buffer_pages_maximum: 256,
            serialization: Serialization::FlatSorted,
            tiers: DEFAULT_TIERS,
            compaction: true,
        }
    }
}

/// Hashes a [`PageId`] for the buffer pool's debug bucket introspection.
/// Production opens use this; tests that want deterministic placement pass
/// their own closure directly to [`BufPool::new`] via [`KvStore::open_with_pool_hash`].
fn default_page_hash(id: &PageId) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

/// The embedded, single-writer, persistent ordered key-value store.
///
/// # Write path
///
/// `Put`/`Delete` land in the memtable. When the memtable is full, it is
/// flushed to a new L0 run (one data file, one filter file), registered in
/// the manifest, and compaction is triggered (if enabled) before the
/// original write is retried against the now-empty memtable.
///
/// # Read path
///
/// `Get` checks the memtable first, then each level newest-run-first; the
/// first hit wins, with a tombstone resolving to "not found". `Scan` merges
/// the memtable with every overlapping run via the same newest-wins,
/// tombstone-suppressing k-way merge compaction uses.
pub struct KvStore {
    naming: DbNaming,
    options: Options,
    memtable: Memtable,
    manifest: Manifest,
    pool: BufPool,
    closed: bool,
}

impl KvStore {
    /// Opens (or creates) the database `name` under `options.dir`.
    ///
    /// Resolves `<dir>/<name>` as the db directory; if `options.overwrite`
    /// is set and the directory exists, it is removed first. Fails with
    /// [`StoreError::DatabaseInUse`] if the lock file is already present.
    pub fn open(name: &str, options: Options) -> Result<Self, StoreError> {
        Self::open_with_pool_hash(name, options, default_page_hash)
    }

    /// Like [`open`](Self::open), but with an explicit buffer-pool hash
    /// function. Exists so tests can pin deterministic bucket placement
    /// (spec.md §4.2: "tests inject `|id| id.page`").
    pub fn open_with_pool_hash(
        name: &str,
        options: Options,
        pool_hash: impl Fn(&PageId) -> u64 + Send + Sync + 'static,
    ) -> Result<Self, StoreError> {
        let naming = DbNaming::new(&options.dir, name);

        if naming.dirpath.exists() && options.overwrite {
            std::fs::remove_dir_all(&naming.dirpath).map_err(StoreError::FailedToOpen)?;
        }
        std::fs::create_dir_all(&naming.dirpath).map_err(StoreError::FailedToOpen)?;

        let lock_path = naming.lock_file();
        if lock_path.exists() {
            return Err(StoreError::DatabaseInUse);
        }
        File::create(&lock_path).map_err(StoreError::FailedToOpen)?;

        let manifest = Manifest::open_or_recover(naming.clone(), options.serialization)?;
        let pool = BufPool::new(options.buffer_pages_maximum, pool_hash);
        let memtable = Memtable::new(options.memory_buffer_elements);

        tracing::info!(
            db = %naming.dirpath.display(),
            levels = manifest.num_levels(),
            "opened database"
        );

        Ok(Self {
            naming,
            options,
            memtable,
            manifest,
            pool,
            closed: false,
        })
    }

    /// Releases the lock file. Any data still sitting in the memtable is
    /// discarded — spec.md §9.ii resolves this Open Question towards
    /// preserving the source's silent loss, since there is no WAL to make a
    /// late flush crash-safe.
    pub fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        let lock_path = self.naming.lock_file();
        if lock_path.exists() {
            std::fs::remove_file(&lock_path)?;
        }
        self.closed = true;
        Ok(())
    }

    /// The resolved `<dir>/<name>` directory this database's files live in.
    pub fn data_directory(&self) -> Result<PathBuf, StoreError> {
        self.require_open()?;
        Ok(self.naming.dirpath.clone())
    }

    /// Inserts or updates `key` with `value`. Fails if `value` is the
    /// reserved tombstone.
    pub fn put(&mut self, key: u64, value: u64) -> Result<(), StoreError> {
        self.require_open()?;
        if value == TOMBSTONE {
            return Err(StoreError::OnlyTheDatabaseCanUseFunnyValues);
        }
        self.put_internal(key, value)
    }

    /// Records a deletion of `key` by writing `(key, TOMBSTONE)`. Unlike
    /// `put`, bypasses the tombstone-value validation.
    pub fn delete(&mut self, key: u64) -> Result<(), StoreError> {
        self.require_open()?;
        self.put_internal(key, TOMBSTONE)
    }

    fn put_internal(&mut self, key: u64, value: u64) -> Result<(), StoreError> {
        match self.memtable.put(key, value) {
            Ok(()) => Ok(()),
            Err(MemtableError::MemtableFull { .. }) => {
                self.flush_memtable()?;
                self.memtable
                    .put(key, value)
                    .expect("memtable has headroom immediately after a flush");
                Ok(())
            }
        }
    }

    /// Flushes the memtable to a new L0 run, registers it, clears the
    /// memtable, and triggers cascading compaction if enabled.
    fn flush_memtable(&mut self) -> Result<(), StoreError> {
        let pairs = self.memtable.scan_all();
        if pairs.is_empty() {
            return Ok(());
        }

        let level0 = LSMLevel::new(0, self.options.tiers);
        let run_idx = level0.next_run(&self.manifest);
        let run = LSMRun::new(0, run_idx);

        let path = self.naming.data_file(0, run_idx, 0);
        sstable::flush(self.options.serialization, &path, &pairs)?;

        let (min_key, _) = *pairs.first().unwrap();
        let (max_key, _) = *pairs.last().unwrap();
        run.register_new_file(
            &self.naming,
            &mut self.manifest,
            0,
            min_key,
            max_key,
            pairs.iter().map(|&(k, _)| k),
        )?;

        tracing::debug!(run = run_idx, entries = pairs.len(), "flushed memtable to L0");

        self.memtable.clear();

        if self.options.compaction {
            compact_cascading(
                &self.naming,
                &mut self.manifest,
                self.options.serialization,
                &mut self.pool,
                self.options.tiers,
                0,
            )?;
        }

        Ok(())
    }

    /// Point lookup: memtable first, then each level newest-run-first. The
    /// first hit wins; a tombstone resolves to `None`.
    pub fn get(&mut self, key: u64) -> Result<Option<u64>, StoreError> {
        self.require_open()?;

        if let Some(value) = self.memtable.get(key) {
            return Ok(resolve(value));
        }

        for level in 0..self.manifest.num_levels() as u32 {
            let num_runs = self.manifest.num_runs(level) as u32;
            for run_idx in (0..num_runs).rev() {
                let run = LSMRun::new(level, run_idx);
                if let Some(value) = run.get(
                    &self.naming,
                    &self.manifest,
                    self.options.serialization,
                    &mut self.pool,
                    key,
                )? {
                    return Ok(resolve(value));
                }
            }
        }

        Ok(None)
    }

    /// Range scan `[lo, hi]` inclusive. Unions the memtable with every
    /// overlapping run, merged newest-wins via the same k-way merge
    /// compaction uses, with tombstoned keys dropped from the result.
    pub fn scan(&mut self, lo: u64, hi: u64) -> Result<Vec<(u64, u64)>, StoreError> {
        self.require_open()?;

        // Oldest-to-newest: the merge's tie-break favors the *last* stream,
        // so streams are built deepest-level-first, then level 0's runs
        // oldest-run-first, with the memtable (always newest) pushed last.
        let mut streams: Vec<Vec<(u64, u64)>> = Vec::new();
        for level in (0..self.manifest.num_levels() as u32).rev() {
            for run_idx in 0..self.manifest.num_runs(level) as u32 {
                let run = LSMRun::new(level, run_idx);
                streams.push(run.scan(
                    &self.naming,
                    &self.manifest,
                    self.options.serialization,
                    &mut self.pool,
                    lo,
                    hi,
                )?);
            }
        }
        streams.push(self.memtable.scan(lo, hi));

        let merged = k_way_merge_streams(streams, false);
        Ok(merged.into_iter().filter(|&(_, v)| v != TOMBSTONE).collect())
    }

    /// Forces the memtable to flush to a new L0 run immediately, even if it
    /// is not yet full. A no-op if the memtable is empty. Exposed for
    /// callers (the CLI's `FLUSH` command) that want deterministic control
    /// over when a run hits disk, rather than waiting on capacity.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.require_open()?;
        self.flush_memtable()
    }

    /// Forces a compaction pass starting at level 0, regardless of whether
    /// it is currently over its tier budget. Backs the CLI's `COMPACT`
    /// command.
    pub fn compact(&mut self) -> Result<(), StoreError> {
        self.require_open()?;
        force_compact(
            &self.naming,
            &mut self.manifest,
            self.options.serialization,
            &mut self.pool,
            self.options.tiers,
            0,
        )?;
        Ok(())
    }

    /// Number of levels with at least one registered run.
    pub fn num_levels(&self) -> usize {
        self.manifest.num_levels()
    }

    /// Number of runs currently registered in `level`.
    pub fn num_runs(&self, level: u32) -> usize {
        self.manifest.num_runs(level)
    }

    /// Number of distinct keys currently buffered in the memtable.
    pub fn memtable_len(&self) -> usize {
        self.memtable.len()
    }

    fn require_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::DatabaseClosed)
        } else {
            Ok(())
        }
    }
}

/// Maps a raw memtable/run value to the caller-facing `Option`, hiding
/// tombstones.
fn resolve(value: u64) -> Option<u64> {
    if value == TOMBSTONE {
        None
    } else {
        Some(value)
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("dir", &self.naming.dirpath)
            .field("closed", &self.closed)
            .field("memtable_entries", &self.memtable.len())
            .field("memtable_capacity", &self.memtable.capacity())
            .field("levels", &self.manifest.num_levels())
            .finish()
    }
}

/// Best-effort lock release on drop, matching the teacher's
/// resource-scoped `Drop` pattern. No flush — see [`KvStore::close`].
impl Drop for KvStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(dir: &std::path::Path) -> Options {
        Options {
            dir: dir.to_path_buf(),
            ..Options::default()
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KvStore::open("t", opts(dir.path())).unwrap();
        store.put(1, 10).unwrap();
        assert_eq!(store.get(1).unwrap(), Some(10));
    }

    #[test]
    fn put_rejects_tombstone_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KvStore::open("t", opts(dir.path())).unwrap();
        let err = store.put(1, TOMBSTONE).unwrap_err();
        assert!(matches!(err, StoreError::OnlyTheDatabaseCanUseFunnyValues));
    }

    #[test]
    fn insert_and_delete_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KvStore::open("t", opts(dir.path())).unwrap();
        store.put(1, 10).unwrap();
        store.delete(1).unwrap();
        assert_eq!(store.get(1).unwrap(), None);
    }

    #[test]
    fn scan_includes_both_ends() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KvStore::open("t", opts(dir.path())).unwrap();
        for (k, v) in [(1, 10), (2, 20), (3, 30)] {
            store.put(k, v).unwrap();
        }
        assert_eq!(store.scan(1, 3).unwrap(), vec![(1, 10), (2, 20), (3, 30)]);
    }

    #[test]
    fn memtable_overflow_flushes_to_l0() {
        let dir = tempfile::tempdir().unwrap();
        let mut o = opts(dir.path());
        o.memory_buffer_elements = 2;
        let mut store = KvStore::open("t", o).unwrap();
        store.put(1, 10).unwrap();
        store.put(2, 20).unwrap();
        store.put(3, 30).unwrap(); // overflow triggers a flush before this insert lands
        for (k, v) in [(1, 10), (2, 20), (3, 30)] {
            assert_eq!(store.get(k).unwrap(), Some(v));
        }
        assert!(store.naming.data_file(0, 0, 0).exists());
    }

    #[test]
    fn operations_after_close_fail() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KvStore::open("t", opts(dir.path())).unwrap();
        store.close().unwrap();
        assert!(matches!(store.get(1).unwrap_err(), StoreError::DatabaseClosed));
    }

    #[test]
    fn second_open_while_locked_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _store = KvStore::open("t", opts(dir.path())).unwrap();
        let err = KvStore::open("t", opts(dir.path())).unwrap_err();
        assert!(matches!(err, StoreError::DatabaseInUse));
    }

    #[test]
    fn reopen_after_close_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KvStore::open("t", opts(dir.path())).unwrap();
        store.put(1, 10).unwrap();
        store.close().unwrap();

        let mut reopened = KvStore::open("t", opts(dir.path())).unwrap();
        // unflushed memtable contents are lost, per spec.
        assert_eq!(reopened.get(1).unwrap(), None);
    }

    #[test]
    fn manual_flush_and_compact_are_available_without_waiting_on_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KvStore::open("t", opts(dir.path())).unwrap();
        store.put(1, 10).unwrap();
        store.flush().unwrap();
        assert_eq!(store.memtable_len(), 0);
        assert_eq!(store.num_runs(0), 1);

        store.put(2, 20).unwrap();
        store.flush().unwrap();
        assert_eq!(store.num_runs(0), 2);

        store.compact().unwrap();
        assert_eq!(store.num_runs(0), 0);
        assert_eq!(store.num_runs(1), 1);
        assert_eq!(store.get(1).unwrap(), Some(10));
        assert_eq!(store.get(2).unwrap(), Some(20));
    }

    #[test]
    fn close_then_open_recovers_flushed_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut o = opts(dir.path());
        o.memory_buffer_elements = 2;
        let mut store = KvStore::open("t", o.clone()).unwrap();
        store.put(1, 10).unwrap();
        store.put(2, 20).unwrap();
        store.put(3, 30).unwrap(); // flush happens here
        store.close().unwrap();

        let mut reopened = KvStore::open("t", o).unwrap();
        assert_eq!(reopened.get(1).unwrap(), Some(10));
        assert_eq!(reopened.get(2).unwrap(), Some(20));
    }
}
