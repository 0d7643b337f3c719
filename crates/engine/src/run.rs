//! A single sorted run within a level: an ordered sequence of sstable files,
//! newest intermediate index last, each guarded by its own Bloom filter.
//!
//! Grounded directly in the source engine's `LSMRunImpl` (`lsm_run.cpp`):
//! `Get` walks files in intermediate order consulting the manifest's range
//! and the file's filter before ever touching the sstable itself; `Scan`
//! finds a starting file via the manifest and then keeps pulling from
//! successive files only while the previous one still yielded keys below
//! `upper`. Unlike the source, which keeps its own open-file handles, this
//! run is a thin value type — every method takes the manifest, naming
//! scheme, and buffer pool it needs as parameters, since nothing here is
//! long-lived across calls.

use crate::manifest::{FileMetadata, Manifest};
use bufpool::BufPool;
use pagefile::DbNaming;
use sstable::Serialization;
use std::io;

/// One sorted run: `level` and `run` together identify it within the
/// manifest; its files are looked up from there rather than cached here.
#[derive(Debug, Clone, Copy)]
pub struct LSMRun {
    /// The level this run belongs to.
    pub level: u32,
    /// The run's index within its level (0 = oldest).
    pub run: u32,
}

impl LSMRun {
    /// Builds a handle for `(level, run)`. Does not touch disk; the run's
    /// files live in the manifest.
    pub fn new(level: u32, run: u32) -> Self {
        Self { level, run }
    }

    /// The intermediate index the next flushed file should use.
    pub fn next_file(&self, manifest: &Manifest) -> u32 {
        manifest.num_files(self.level, self.run) as u32
    }

    /// Point lookup across every file in the run, newest (`intermediate`)
    /// last — since later files' keys never shadow earlier ones within the
    /// *same* run (nothing in this layer overwrites a file in place),
    /// files are checked in ascending order until one answers.
    pub fn get(
        &self,
        naming: &DbNaming,
        manifest: &Manifest,
        serialization: Serialization,
        pool: &mut BufPool,
        key: u64,
    ) -> io::Result<Option<u64>> {
        for file in manifest.files_in_run(self.level, self.run) {
            if !manifest.in_range(self.level, self.run, file.id.intermediate, key) {
                continue;
            }

            let filter_path = naming.filter_file(self.level, self.run, file.id.intermediate);
            if filter_path.exists() && !bloom::read_filter_file(&filter_path, key)? {
                continue;
            }

            let data_path = naming.data_file(self.level, self.run, file.id.intermediate);
            if let Some(value) = sstable::get_from_file(serialization, &data_path, key, pool)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Range scan `[lo, hi]` inclusive across the run's files, in ascending
    /// key order. Starts at the first file whose range overlaps `[lo, hi]`
    /// and keeps advancing through successive files while the previous one
    /// both yielded results and hadn't yet reached `hi`.
    pub fn scan(
        &self,
        naming: &DbNaming,
        manifest: &Manifest,
        serialization: Serialization,
        pool: &mut BufPool,
        lo: u64,
        hi: u64,
    ) -> io::Result<Vec<(u64, u64)>> {
        let files = manifest.files_in_run(self.level, self.run);
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let mut intermediate = manifest
            .first_file_in_range(self.level, self.run, lo, hi)
            .unwrap_or(0);

        let mut out = Vec::new();
        loop {
            let path = naming.data_file(self.level, self.run, intermediate);
            let found = sstable::scan_in_file(serialization, &path, lo, hi, pool)?;
            let last_key = found.last().map(|&(k, _)| k);
            out.extend(found);

            let has_next_file = files.iter().any(|f| f.id.intermediate == intermediate + 1);
            match last_key {
                Some(k) if has_next_file && k < hi => intermediate += 1,
                _ => break,
            }
        }
        Ok(out)
    }

    /// Registers a newly flushed file `intermediate` with range
    /// `[min_key, max_key]`, and builds its Bloom filter from `keys`.
    pub fn register_new_file(
        &self,
        naming: &DbNaming,
        manifest: &mut Manifest,
        intermediate: u32,
        min_key: u64,
        max_key: u64,
        keys: impl IntoIterator<Item = u64>,
    ) -> io::Result<()> {
        let filter_path = naming.filter_file(self.level, self.run, intermediate);
        bloom::write_filter_file(&filter_path, keys, seed_for(self.level, self.run, intermediate))?;

        manifest.register_new_files(vec![FileMetadata {
            id: pagefile::FileId {
                level: self.level,
                run: self.run,
                intermediate,
            },
            min_key,
            max_key,
        }])
    }

    /// Deletes every data and filter file belonging to this run and removes
    /// them from the manifest.
    pub fn delete(&self, naming: &DbNaming, manifest: &mut Manifest) -> io::Result<()> {
        let files = manifest.files_in_run(self.level, self.run);
        let ids: Vec<pagefile::FileId> = files.iter().map(|f| f.id).collect();

        for file in &files {
            let data_path = naming.data_file(self.level, self.run, file.id.intermediate);
            if data_path.exists() {
                sstable::delete_file(&data_path)?;
            }
            let filter_path = naming.filter_file(self.level, self.run, file.id.intermediate);
            if filter_path.exists() {
                std::fs::remove_file(&filter_path)?;
            }
        }

        manifest.remove_files(&ids)
    }

    /// Reads every pair out of file `intermediate`, in key order. Used by
    /// compaction to stream a run's files into the merge.
    pub fn drain_file(
        &self,
        naming: &DbNaming,
        serialization: Serialization,
        pool: &mut BufPool,
        intermediate: u32,
    ) -> io::Result<Vec<(u64, u64)>> {
        let path = naming.data_file(self.level, self.run, intermediate);
        sstable::drain(serialization, &path, pool)
    }
}

/// Deterministic per-file filter seed so re-flushing the same file identity
/// never accidentally reuses another file's filter bit pattern.
fn seed_for(level: u32, run: u32, intermediate: u32) -> u64 {
    ((level as u64) << 48) | ((run as u64) << 24) | intermediate as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;

    fn naming(dir: &std::path::Path) -> DbNaming {
        let naming = DbNaming::new(dir, "t");
        std::fs::create_dir_all(&naming.dirpath).unwrap();
        naming
    }

    fn pool() -> BufPool {
        BufPool::new(64, |id| id.page)
    }

    #[test]
    fn register_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let naming = naming(dir.path());
        let mut manifest = Manifest::open_or_recover(naming.clone(), Serialization::FlatSorted).unwrap();
        let run = LSMRun::new(0, 0);

        let pairs: Vec<(u64, u64)> = (0..50).map(|i| (i, i * 10)).collect();
        let path = naming.data_file(0, 0, 0);
        sstable::flush(Serialization::FlatSorted, &path, &pairs).unwrap();
        run.register_new_file(&naming, &mut manifest, 0, 0, 49, pairs.iter().map(|&(k, _)| k))
            .unwrap();

        let mut pool = pool();
        assert_eq!(
            run.get(&naming, &manifest, Serialization::FlatSorted, &mut pool, 25)
                .unwrap(),
            Some(250)
        );
        assert_eq!(
            run.get(&naming, &manifest, Serialization::FlatSorted, &mut pool, 999)
                .unwrap(),
            None
        );
    }

    #[test]
    fn scan_spans_multiple_files() {
        let dir = tempfile::tempdir().unwrap();
        let naming = naming(dir.path());
        let mut manifest = Manifest::open_or_recover(naming.clone(), Serialization::FlatSorted).unwrap();
        let run = LSMRun::new(0, 0);

        for (i, chunk) in [(0u64..10), (10..20), (20..30)].into_iter().enumerate() {
            let pairs: Vec<(u64, u64)> = chunk.map(|k| (k, k)).collect();
            let path = naming.data_file(0, 0, i as u32);
            sstable::flush(Serialization::FlatSorted, &path, &pairs).unwrap();
            let (min, max) = (pairs.first().unwrap().0, pairs.last().unwrap().0);
            run.register_new_file(&naming, &mut manifest, i as u32, min, max, pairs.iter().map(|&(k, _)| k))
                .unwrap();
        }

        let mut pool = pool();
        let got = run
            .scan(&naming, &manifest, Serialization::FlatSorted, &mut pool, 5, 24)
            .unwrap();
        let expected: Vec<(u64, u64)> = (5..=24).map(|k| (k, k)).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn delete_removes_files_and_manifest_entries() {
        let dir = tempfile::tempdir().unwrap();
        let naming = naming(dir.path());
        let mut manifest = Manifest::open_or_recover(naming.clone(), Serialization::FlatSorted).unwrap();
        let run = LSMRun::new(0, 0);

        let pairs = vec![(1u64, 1u64)];
        let path = naming.data_file(0, 0, 0);
        sstable::flush(Serialization::FlatSorted, &path, &pairs).unwrap();
        run.register_new_file(&naming, &mut manifest, 0, 1, 1, [1u64]).unwrap();

        run.delete(&naming, &mut manifest).unwrap();
        assert!(!path.exists());
        assert_eq!(manifest.num_files(0, 0), 0);
    }
}
