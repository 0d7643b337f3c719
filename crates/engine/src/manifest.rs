//! The persistent catalog of levels → runs → files with their key ranges.
//!
//! Grounded in the source engine's `ManifestHandleImpl` (`manifest.cpp`): a
//! read-through in-memory mirror backed by a single binary file, rewritten
//! in full (truncate-and-rewrite, matching `to_file`'s
//! `std::fstream::trunc`) on every registration or removal. If no manifest
//! file exists yet, the data directory is scanned for files matching the
//! naming scheme and each is opened to recover its `min`/`max` range
//! (`discover_data`), exactly as the source does on first `Open`.
//!
//! Wire format (page 0, then a flat run of `u64` words zero-padded to a page
//! boundary):
//!
//! ```text
//! [magic][file_type][num_levels][total_files]
//! for each level:
//!   [(level_no << 32) | file_count]
//!   for each file:
//!     [(run << 32) | intermediate][min_key][max_key]
//! ```

use bufpool::BufPool;
use pagefile::{DbNaming, FileId, FileType, PAGE_SIZE};
use sstable::Serialization;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// `(id, min_key, max_key)` for one sorted-run data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// The file's `{level, run, intermediate}` identity.
    pub id: FileId,
    /// The smallest key stored in the file.
    pub min_key: u64,
    /// The largest key stored in the file.
    pub max_key: u64,
}

/// Read-through in-memory mirror of the on-disk manifest.
pub struct Manifest {
    naming: DbNaming,
    levels: Vec<Vec<FileMetadata>>,
}

impl Manifest {
    /// Opens the manifest at `naming`'s path, or recovers it by scanning the
    /// data directory for orphaned `DATA` files (and writing a fresh
    /// manifest from what it finds) if no manifest file exists yet.
    pub fn open_or_recover(naming: DbNaming, serialization: Serialization) -> io::Result<Self> {
        let manifest_path = naming.manifest_file();
        if manifest_path.exists() {
            let levels = read_manifest_file(&manifest_path)?;
            Ok(Self { naming, levels })
        } else {
            let levels = discover_from_directory(&naming, serialization)?;
            let manifest = Self { naming, levels };
            manifest.write_to_disk()?;
            Ok(manifest)
        }
    }

    /// The naming scheme this manifest's database uses.
    pub fn naming(&self) -> &DbNaming {
        &self.naming
    }

    /// Files in `level` whose `[min, max]` range contains `key`, regardless
    /// of which run they belong to.
    pub fn get_potential_files(&self, level: u32, key: u64) -> Vec<PathBuf> {
        let Some(files) = self.levels.get(level as usize) else {
            return Vec::new();
        };
        files
            .iter()
            .filter(|f| f.min_key <= key && key <= f.max_key)
            .map(|f| self.naming.data_file(f.id.level, f.id.run, f.id.intermediate))
            .collect()
    }

    /// `true` if file `(level, run, intermediate)` is registered and its
    /// range contains `key`.
    pub fn in_range(&self, level: u32, run: u32, intermediate: u32, key: u64) -> bool {
        let Some(files) = self.levels.get(level as usize) else {
            return false;
        };
        files.iter().any(|f| {
            f.id.run == run
                && f.id.intermediate == intermediate
                && f.min_key <= key
                && key <= f.max_key
        })
    }

    /// The smallest-indexed file in `(level, run)` whose range intersects
    /// `[lo, hi]`, used to find where a run scan should start.
    pub fn first_file_in_range(&self, level: u32, run: u32, lo: u64, hi: u64) -> Option<u32> {
        let files = self.levels.get(level as usize)?;
        files
            .iter()
            .filter(|f| f.id.run == run && f.min_key <= hi && f.max_key >= lo)
            .map(|f| f.id.intermediate)
            .min()
    }

    /// Appends `files` to their respective levels and rewrites the manifest.
    pub fn register_new_files(&mut self, files: Vec<FileMetadata>) -> io::Result<()> {
        for file in files {
            let level = file.id.level as usize;
            if self.levels.len() <= level {
                self.levels.resize(level + 1, Vec::new());
            }
            self.levels[level].push(file);
        }
        self.write_to_disk()
    }

    /// Removes every registered file matching one of `ids` and rewrites the
    /// manifest.
    pub fn remove_files(&mut self, ids: &[FileId]) -> io::Result<()> {
        for level in &mut self.levels {
            level.retain(|f| !ids.contains(&f.id));
        }
        self.write_to_disk()
    }

    /// Number of levels with at least one registered file.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Number of distinct runs registered in `level`.
    pub fn num_runs(&self, level: u32) -> usize {
        let Some(files) = self.levels.get(level as usize) else {
            return 0;
        };
        let mut runs: Vec<u32> = files.iter().map(|f| f.id.run).collect();
        runs.sort_unstable();
        runs.dedup();
        runs.len()
    }

    /// Number of files registered in `(level, run)`.
    pub fn num_files(&self, level: u32, run: u32) -> usize {
        let Some(files) = self.levels.get(level as usize) else {
            return 0;
        };
        files.iter().filter(|f| f.id.run == run).count()
    }

    /// All file metadata currently registered in `(level, run)`, ordered by
    /// intermediate index.
    pub fn files_in_run(&self, level: u32, run: u32) -> Vec<FileMetadata> {
        let Some(files) = self.levels.get(level as usize) else {
            return Vec::new();
        };
        let mut out: Vec<FileMetadata> = files.iter().filter(|f| f.id.run == run).copied().collect();
        out.sort_by_key(|f| f.id.intermediate);
        out
    }

    fn write_to_disk(&self) -> io::Result<()> {
        let mut words: Vec<u64> = vec![
            pagefile::MAGIC,
            FileType::Manifest as u64,
            self.levels.len() as u64,
            self.levels.iter().map(|l| l.len() as u64).sum(),
        ];

        for (level_no, files) in self.levels.iter().enumerate() {
            words.push(((level_no as u64) << 32) | files.len() as u64);
            for file in files {
                words.push(((file.id.run as u64) << 32) | file.id.intermediate as u64);
                words.push(file.min_key);
                words.push(file.max_key);
            }
        }

        let words_per_page = PAGE_SIZE / 8;
        let remainder = words.len() % words_per_page;
        if remainder != 0 {
            words.resize(words.len() + (words_per_page - remainder), 0);
        }

        // Truncate-and-rewrite, matching the source's `std::fstream::trunc`
        // open mode: the whole file is rebuilt from the in-memory mirror on
        // every call, so there is no incremental on-disk state to corrupt.
        let mut file = File::create(self.naming.manifest_file())?;
        for word in &words {
            file.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }
}

fn read_manifest_file(path: &std::path::Path) -> io::Result<Vec<Vec<FileMetadata>>> {
    let mut file = File::open(path)?;
    let mut header = [0u8; 32];
    file.read_exact(&mut header)?;

    let magic = u64::from_le_bytes(header[0..8].try_into().unwrap());
    if magic != pagefile::MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad manifest magic"));
    }
    let file_type = u64::from_le_bytes(header[8..16].try_into().unwrap()) & 0xff;
    if file_type != FileType::Manifest as u64 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "not a manifest file"));
    }
    let num_levels = u64::from_le_bytes(header[16..24].try_into().unwrap()) as usize;

    let mut levels: Vec<Vec<FileMetadata>> = vec![Vec::new(); num_levels];
    file.seek(SeekFrom::Start(32))?;
    for level_no in 0..num_levels {
        let mut word = [0u8; 8];
        file.read_exact(&mut word)?;
        let tagged = u64::from_le_bytes(word);
        let level_num = (tagged >> 32) as u32;
        let file_count = (tagged & 0xffff_ffff) as usize;
        debug_assert_eq!(level_num as usize, level_no);

        for _ in 0..file_count {
            let mut id_word = [0u8; 8];
            let mut min_word = [0u8; 8];
            let mut max_word = [0u8; 8];
            file.read_exact(&mut id_word)?;
            file.read_exact(&mut min_word)?;
            file.read_exact(&mut max_word)?;
            let id_tagged = u64::from_le_bytes(id_word);
            let run = (id_tagged >> 32) as u32;
            let intermediate = (id_tagged & 0xffff_ffff) as u32;
            levels[level_no].push(FileMetadata {
                id: FileId {
                    level: level_no as u32,
                    run,
                    intermediate,
                },
                min_key: u64::from_le_bytes(min_word),
                max_key: u64::from_le_bytes(max_word),
            });
        }
    }

    Ok(levels)
}

fn discover_from_directory(
    naming: &DbNaming,
    serialization: Serialization,
) -> io::Result<Vec<Vec<FileMetadata>>> {
    let mut levels: Vec<Vec<FileMetadata>> = Vec::new();
    let mut pool = BufPool::new(4, |id| id.page);

    if !naming.dirpath.exists() {
        return Ok(levels);
    }

    let mut entries: Vec<_> = std::fs::read_dir(&naming.dirpath)?
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let filename = entry.file_name();
        let Some(filename) = filename.to_str() else {
            continue;
        };
        let Some(id) = pagefile::parse_data_file(naming, filename) else {
            continue;
        };

        let path = entry.path();
        let min_key = sstable::get_minimum(serialization, &path, &mut pool)?;
        let max_key = sstable::get_maximum(serialization, &path, &mut pool)?;

        if levels.len() <= id.level as usize {
            levels.resize(id.level as usize + 1, Vec::new());
        }
        levels[id.level as usize].push(FileMetadata {
            id,
            min_key,
            max_key,
        });
    }

    Ok(levels)
}
