//! Derives file paths for a database's manifest, lock, data, and filter
//! files from `(db dir, db name, level, run, intermediate)`.

use std::path::{Path, PathBuf};

/// Identifies a database directory: the parent directory plus the database
/// name, which together determine every file path the engine touches.
#[derive(Debug, Clone)]
pub struct DbNaming {
    /// Directory containing this database's files (`<dir>/<name>/`).
    pub dirpath: PathBuf,
    /// The database name.
    pub name: String,
}

impl DbNaming {
    /// Builds a naming scheme rooted at `dir.join(name)`.
    pub fn new(dir: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            dirpath: dir.as_ref().join(&name),
            name,
        }
    }

    /// Path to the manifest file: `<dir>/<name>.MANIFEST`.
    pub fn manifest_file(&self) -> PathBuf {
        self.dirpath.join(format!("{}.MANIFEST", self.name))
    }

    /// Path to the lock file: `<dir>/<name>.LOCK`.
    pub fn lock_file(&self) -> PathBuf {
        self.dirpath.join(format!("{}.LOCK", self.name))
    }

    /// Path to a sorted-run data file for `(level, run, intermediate)`.
    pub fn data_file(&self, level: u32, run: u32, intermediate: u32) -> PathBuf {
        self.dirpath.join(format!(
            "{}.DATA.L{}.R{}.I{}",
            self.name, level, run, intermediate
        ))
    }

    /// Path to the Bloom filter file for `(level, run, intermediate)`.
    pub fn filter_file(&self, level: u32, run: u32, intermediate: u32) -> PathBuf {
        self.dirpath.join(format!(
            "{}.FILTER.L{}.R{}.I{}",
            self.name, level, run, intermediate
        ))
    }
}

/// The `{level, run, intermediate}` triple that identifies a data/filter
/// file pair within the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileId {
    /// The level the file belongs to.
    pub level: u32,
    /// The run within the level.
    pub run: u32,
    /// The 0-based index of the file within the run.
    pub intermediate: u32,
}

/// Recognizes whether `filename` is a `DATA` file belonging to `naming`, and
/// if so, parses its `{level, run, intermediate}` triple.
pub fn parse_data_file(naming: &DbNaming, filename: &str) -> Option<FileId> {
    let prefix = format!("{}.DATA.", naming.name);
    let rest = filename.strip_prefix(&prefix)?;
    parse_lri(rest)
}

/// Recognizes whether `filename` is a `FILTER` file belonging to `naming`,
/// and if so, parses its `{level, run, intermediate}` triple.
pub fn parse_filter_file(naming: &DbNaming, filename: &str) -> Option<FileId> {
    let prefix = format!("{}.FILTER.", naming.name);
    let rest = filename.strip_prefix(&prefix)?;
    parse_lri(rest)
}

/// Parses the trailing `L{level}.R{run}.I{intermediate}` portion of a
/// data/filter filename.
fn parse_lri(rest: &str) -> Option<FileId> {
    let mut parts = rest.split('.');
    let level = parts.next()?.strip_prefix('L')?.parse().ok()?;
    let run = parts.next()?.strip_prefix('R')?.parse().ok()?;
    let intermediate = parts.next()?.strip_prefix('I')?.parse().ok()?;
    Some(FileId {
        level,
        run,
        intermediate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_data_file_names() {
        let naming = DbNaming::new("/tmp", "mydb");
        let path = naming.data_file(2, 3, 7);
        let filename = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(filename, "mydb.DATA.L2.R3.I7");
        assert_eq!(
            parse_data_file(&naming, filename),
            Some(FileId {
                level: 2,
                run: 3,
                intermediate: 7
            })
        );
    }

    #[test]
    fn round_trips_filter_file_names() {
        let naming = DbNaming::new("/tmp", "mydb");
        let path = naming.filter_file(0, 1, 0);
        let filename = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(filename, "mydb.FILTER.L0.R1.I0");
        assert_eq!(
            parse_filter_file(&naming, filename),
            Some(FileId {
                level: 0,
                run: 1,
                intermediate: 0
            })
        );
    }

    #[test]
    fn rejects_foreign_filenames() {
        let naming = DbNaming::new("/tmp", "mydb");
        assert_eq!(parse_data_file(&naming, "other.DATA.L0.R0.I0"), None);
        assert_eq!(parse_data_file(&naming, "mydb.MANIFEST"), None);
    }

    #[test]
    fn manifest_and_lock_paths() {
        let naming = DbNaming::new("/tmp", "mydb");
        assert_eq!(naming.manifest_file(), Path::new("/tmp/mydb/mydb.MANIFEST"));
        assert_eq!(naming.lock_file(), Path::new("/tmp/mydb/mydb.LOCK"));
    }
}
