//! # pagefile
//!
//! Shared on-disk building blocks for every file the storage engine writes:
//! the fixed page size, the magic-number header every file begins with, the
//! file-naming scheme that derives paths from `(db dir, db name, level, run,
//! intermediate)`, and the reserved tombstone value.
//!
//! Every data, filter, and manifest file begins with the same page-0 header:
//!
//! ```text
//! [magic: u64 LE = 0x00db00beef00db00][file_type: u64 LE, low byte only]
//! ```
//!
//! `bloom`, `sstable`, and `engine` all depend on this crate so that the
//! header and naming conventions stay in exactly one place.

mod naming;

pub use naming::{parse_data_file, parse_filter_file, DbNaming, FileId};

use std::io::{self, Read, Write};
use thiserror::Error;

/// Size in bytes of a single page — the unit of I/O and of the buffer pool.
pub const PAGE_SIZE: usize = 4096;

/// Width in bytes of a key (`u64`).
pub const KEY_SIZE: usize = 8;

/// Width in bytes of a value (`u64`).
pub const VALUE_SIZE: usize = 8;

/// Reserved value marking a deletion. Illegal as a user-supplied `Put` value.
pub const TOMBSTONE: u64 = 0x00db_00de_ad00_db00;

/// Magic number stored as the first 8 bytes of every file's page 0.
pub const MAGIC: u64 = 0x00db_00be_ef00_db00;

/// Identifies the kind of file a page-0 header belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    /// The database manifest (catalog of levels, runs, and files).
    Manifest = 0,
    /// A sorted-run data file (flat-sorted or B-tree).
    Data = 1,
    /// A blocked Bloom filter file.
    Filter = 2,
}

impl FileType {
    fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FileType::Manifest),
            1 => Some(FileType::Data),
            2 => Some(FileType::Filter),
            _ => None,
        }
    }
}

/// A page-0 header failed to validate: wrong magic number, an unrecognized
/// file-type tag, or the underlying read itself failed.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// The first 8 bytes of page 0 were not [`MAGIC`].
    #[error("bad page-0 magic: {found:#x} (expected {MAGIC:#x})")]
    BadMagic {
        /// The magic word actually read from the file.
        found: u64,
    },
    /// The type tag's low byte did not match any [`FileType`] variant.
    #[error("unrecognized file type tag: {tag}")]
    UnknownFileType {
        /// The unrecognized tag byte.
        tag: u8,
    },
    /// Reading the header bytes themselves failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<HeaderError> for io::Error {
    fn from(e: HeaderError) -> Self {
        match e {
            HeaderError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

/// Writes the standard page-0 header (`magic`, `file_type`) to `w`.
///
/// Callers are responsible for writing the remainder of page 0 (and for
/// padding it out to [`PAGE_SIZE`]) themselves.
pub fn write_header<W: Write>(w: &mut W, file_type: FileType) -> io::Result<()> {
    w.write_all(&MAGIC.to_le_bytes())?;
    w.write_all(&(file_type as u64).to_le_bytes())?;
    Ok(())
}

/// Reads and validates the standard page-0 header from `r`.
///
/// Returns the parsed [`FileType`], or a [`HeaderError`] if the magic number
/// is absent or the type tag is unrecognized.
pub fn read_header<R: Read>(r: &mut R) -> Result<FileType, HeaderError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    let magic = u64::from_le_bytes(buf);
    if magic != MAGIC {
        return Err(HeaderError::BadMagic { found: magic });
    }

    r.read_exact(&mut buf)?;
    let tagged = u64::from_le_bytes(buf);
    let tag = (tagged & 0xff) as u8;
    FileType::from_u8(tag).ok_or(HeaderError::UnknownFileType { tag })
}

/// Rounds `bytes` up to the next multiple of [`PAGE_SIZE`], expressed in pages.
pub fn pages_for_bytes(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_round_trips() {
        let mut buf = Vec::new();
        write_header(&mut buf, FileType::Filter).unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(read_header(&mut cur).unwrap(), FileType::Filter);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut buf = [0u8; 16];
        buf[0] = 0xff;
        let mut cur = Cursor::new(buf);
        assert!(read_header(&mut cur).is_err());
    }

    #[test]
    fn pages_for_bytes_rounds_up() {
        assert_eq!(pages_for_bytes(0), 0);
        assert_eq!(pages_for_bytes(1), 1);
        assert_eq!(pages_for_bytes(PAGE_SIZE), 1);
        assert_eq!(pages_for_bytes(PAGE_SIZE + 1), 2);
    }
}
