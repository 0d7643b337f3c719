//! A level holds `tiers - 1` runs at most before compaction merges them
//! into the next level down.
//!
//! Grounded in spec §4.10: compaction is a k-way merge of every run's
//! files in a level, writing output in `255`-pair leaves to a fresh run in
//! `level + 1`, then deleting the inputs. Cascading compactions are
//! processed eagerly, one level at a time, via [`compact_cascading`].

use crate::manifest::Manifest;
use crate::merge::k_way_merge_streams;
use crate::run::LSMRun;
use bufpool::BufPool;
use pagefile::DbNaming;
use sstable::Serialization;
use std::io;

/// The number of pairs written per output sstable file during compaction,
/// matching the source's B-tree leaf capacity so both serialization formats
/// see the same file granularity.
const COMPACTION_LEAF_SIZE: usize = 255;

/// A single level's worth of runs.
#[derive(Debug, Clone, Copy)]
pub struct LSMLevel {
    /// This level's index (0 = newest/smallest).
    pub level: u32,
    /// Runs per level before compaction triggers (`tiers - 1` is the actual
    /// capacity; `tiers` is stored as given so the threshold is visible).
    pub tiers: u8,
}

impl LSMLevel {
    /// Builds a handle for `level` with the given tier threshold.
    pub fn new(level: u32, tiers: u8) -> Self {
        Self { level, tiers }
    }

    /// The run index the next flush or compaction output into this level
    /// should use.
    pub fn next_run(&self, manifest: &Manifest) -> u32 {
        manifest.num_runs(self.level) as u32
    }

    /// `true` if this level currently holds `tiers - 1` or more runs, i.e.
    /// the next registration would overflow its tier budget.
    pub fn is_over_capacity(&self, manifest: &Manifest) -> bool {
        manifest.num_runs(self.level) as u32 >= self.tiers.saturating_sub(1) as u32
    }
}

/// Compacts `level` into `level + 1` if it is over capacity, then does the
/// same for `level + 1`, and so on, until the topmost affected level has
/// room. `is_final_level` decides, for each level compacted into, whether
/// tombstones are dropped from its output (true only when nothing deeper
/// currently holds data).
pub fn compact_cascading(
    naming: &DbNaming,
    manifest: &mut Manifest,
    serialization: Serialization,
    pool: &mut BufPool,
    tiers: u8,
    mut level: u32,
) -> io::Result<()> {
    loop {
        let this_level = LSMLevel::new(level, tiers);
        if !this_level.is_over_capacity(manifest) {
            break;
        }
        compact_one_level(naming, manifest, serialization, pool, tiers, level)?;
        level += 1;
    }
    Ok(())
}

/// Compacts `level` regardless of whether it is currently over its tier
/// budget, then lets [`compact_cascading`] take over for whatever that
/// leaves behind in `level + 1`. Backs the `KvStore`'s manual `compact()`
/// entry point; a no-op if `level` holds no runs.
pub fn force_compact(
    naming: &DbNaming,
    manifest: &mut Manifest,
    serialization: Serialization,
    pool: &mut BufPool,
    tiers: u8,
    level: u32,
) -> io::Result<()> {
    if manifest.num_runs(level) == 0 {
        return Ok(());
    }
    compact_one_level(naming, manifest, serialization, pool, tiers, level)?;
    compact_cascading(naming, manifest, serialization, pool, tiers, level + 1)
}

/// Merges every run currently registered in `level` into one new run
/// registered in `level + 1`, then deletes the inputs.
fn compact_one_level(
    naming: &DbNaming,
    manifest: &mut Manifest,
    serialization: Serialization,
    pool: &mut BufPool,
    tiers: u8,
    level: u32,
) -> io::Result<()> {
    let input_runs: Vec<u32> = (0..manifest.num_runs(level) as u32).collect();

    // Streams must be supplied oldest-to-newest so the merge's tie-break
    // (favor the higher stream index) resolves to "newest run wins".
    let mut streams: Vec<Vec<(u64, u64)>> = Vec::with_capacity(input_runs.len());
    for run_idx in &input_runs {
        let run = LSMRun::new(level, *run_idx);
        let files = manifest.files_in_run(level, *run_idx);
        let mut run_pairs = Vec::new();
        for file in files {
            run_pairs.extend(run.drain_file(naming, serialization, pool, file.id.intermediate)?);
        }
        streams.push(run_pairs);
    }

    // Deepest level with any registered file other than the one we're about
    // to write: if nothing lives below `level`, the merge's output is the
    // final resting place for its keys and tombstones may be dropped.
    let drop_tombstones = (level as usize + 1) >= manifest.num_levels()
        || (level as usize + 1..manifest.num_levels()).all(|l| manifest.num_runs(l as u32) == 0);

    let merged = k_way_merge_streams(streams, drop_tombstones);

    let target_level = level + 1;
    let target = LSMLevel::new(target_level, tiers);
    let target_run = target.next_run(manifest);
    let output_run = LSMRun::new(target_level, target_run);

    for (intermediate, chunk) in merged.chunks(COMPACTION_LEAF_SIZE).enumerate() {
        let path = naming.data_file(target_level, target_run, intermediate as u32);
        sstable::flush(serialization, &path, chunk)?;
        let min_key = chunk.first().unwrap().0;
        let max_key = chunk.last().unwrap().0;
        output_run.register_new_file(
            naming,
            manifest,
            intermediate as u32,
            min_key,
            max_key,
            chunk.iter().map(|&(k, _)| k),
        )?;
    }

    for run_idx in input_runs {
        LSMRun::new(level, run_idx).delete(naming, manifest)?;
    }

    Ok(())
}
