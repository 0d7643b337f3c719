//! Shared helper for reading sorted-run pages through the buffer pool.

use bufpool::{BufPool, PageId};
use pagefile::PAGE_SIZE;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// A page's worth of bytes.
pub type PageBytes = Vec<u8>;

/// Reads page `page_idx` of the file at `path`, going through `pool`.
///
/// On a cache miss, opens the file, seeks to the page's byte offset, reads
/// exactly [`PAGE_SIZE`] bytes, and populates the pool before returning.
pub fn read_page(
    path: &Path,
    page_idx: u64,
    page_type: u8,
    pool: &mut BufPool,
) -> io::Result<PageBytes> {
    let id = PageId::new(path, page_idx);
    if let Some(cached) = pool.get(&id) {
        return Ok(cached.contents);
    }

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(page_idx * PAGE_SIZE as u64))?;
    let mut buf = vec![0u8; PAGE_SIZE];
    file.read_exact(&mut buf)?;

    pool.put(id, page_type, buf.clone());
    Ok(buf)
}

/// Number of `(key, value)` pairs, each 16 bytes, that fit in one page.
pub const PAIRS_PER_PAGE: usize = PAGE_SIZE / 16;

pub(crate) fn read_u64_le(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
}

pub(crate) fn write_u64_le(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
