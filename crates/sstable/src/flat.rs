//! Flat-sorted sorted-run format: a packed, binary-searchable array of
//! `(key, value)` pairs.
//!
//! Page 0 holds the header (`magic, type, num_pairs, min_key, max_key`),
//! zero-padded to a full page. Pairs start at page 1, packed 256 to a page
//! (`PAIRS_PER_PAGE`), with the final page zero-padded. Keeping the header
//! on its own page means no pair ever straddles a page boundary, which keeps
//! buffer-pool-backed binary search simple.

use crate::pagecache::{read_page, read_u64_le, write_u64_le, PAIRS_PER_PAGE};
use bufpool::BufPool;
use pagefile::{FileType, PAGE_SIZE};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

const HEADER_NUM_PAIRS_OFFSET: usize = 16;
const HEADER_MIN_KEY_OFFSET: usize = 24;
const HEADER_MAX_KEY_OFFSET: usize = 32;

/// Writes a flat-sorted run file from an already key-sorted slice of pairs.
pub fn flush(path: &Path, pairs: &[(u64, u64)]) -> io::Result<()> {
    let mut file = File::create(path)?;

    let mut header = vec![0u8; PAGE_SIZE];
    {
        let mut cursor = std::io::Cursor::new(&mut header[..16]);
        pagefile::write_header(&mut cursor, FileType::Data)?;
    }
    write_u64_le(&mut header, HEADER_NUM_PAIRS_OFFSET, pairs.len() as u64);
    if let Some(&(min_key, _)) = pairs.first() {
        write_u64_le(&mut header, HEADER_MIN_KEY_OFFSET, min_key);
    }
    if let Some(&(max_key, _)) = pairs.last() {
        write_u64_le(&mut header, HEADER_MAX_KEY_OFFSET, max_key);
    }
    file.write_all(&header)?;

    let mut page = vec![0u8; PAGE_SIZE];
    let mut in_page = 0usize;
    for &(k, v) in pairs {
        let off = in_page * 16;
        write_u64_le(&mut page, off, k);
        write_u64_le(&mut page, off + 8, v);
        in_page += 1;
        if in_page == PAIRS_PER_PAGE {
            file.write_all(&page)?;
            page.iter_mut().for_each(|b| *b = 0);
            in_page = 0;
        }
    }
    if in_page > 0 {
        file.write_all(&page)?;
    }

    Ok(())
}

struct Header {
    num_pairs: u64,
    min_key: u64,
    max_key: u64,
}

fn read_header(path: &Path, pool: &mut BufPool) -> io::Result<Header> {
    let page = read_page(path, 0, FileType::Data as u8, pool)?;
    Ok(Header {
        num_pairs: read_u64_le(&page, HEADER_NUM_PAIRS_OFFSET),
        min_key: read_u64_le(&page, HEADER_MIN_KEY_OFFSET),
        max_key: read_u64_le(&page, HEADER_MAX_KEY_OFFSET),
    })
}

fn pair_at(path: &Path, index: u64, pool: &mut BufPool) -> io::Result<(u64, u64)> {
    let page_idx = 1 + index / PAIRS_PER_PAGE as u64;
    let in_page = (index % PAIRS_PER_PAGE as u64) as usize * 16;
    let page = read_page(path, page_idx, FileType::Data as u8, pool)?;
    Ok((read_u64_le(&page, in_page), read_u64_le(&page, in_page + 8)))
}

/// Lowest pair index whose key is `>= target`, in `[0, num_pairs]`.
fn lower_bound(path: &Path, num_pairs: u64, target: u64, pool: &mut BufPool) -> io::Result<u64> {
    let (mut lo, mut hi) = (0u64, num_pairs);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let (k, _) = pair_at(path, mid, pool)?;
        if k < target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

/// Point lookup. Returns `None` if `key` is out of the file's range or not
/// found after binary search.
pub fn get_from_file(path: &Path, key: u64, pool: &mut BufPool) -> io::Result<Option<u64>> {
    let header = read_header(path, pool)?;
    if header.num_pairs == 0 || key < header.min_key || key > header.max_key {
        return Ok(None);
    }

    let idx = lower_bound(path, header.num_pairs, key, pool)?;
    if idx < header.num_pairs {
        let (k, v) = pair_at(path, idx, pool)?;
        if k == key {
            return Ok(Some(v));
        }
    }
    Ok(None)
}

/// Range scan `[lo, hi]` inclusive, ascending key order.
pub fn scan_in_file(
    path: &Path,
    lo: u64,
    hi: u64,
    pool: &mut BufPool,
) -> io::Result<Vec<(u64, u64)>> {
    let header = read_header(path, pool)?;
    if header.num_pairs == 0 || lo > header.max_key || hi < header.min_key {
        return Ok(Vec::new());
    }

    let mut idx = lower_bound(path, header.num_pairs, lo, pool)?;
    let mut out = Vec::new();
    while idx < header.num_pairs {
        let (k, v) = pair_at(path, idx, pool)?;
        if k > hi {
            break;
        }
        out.push((k, v));
        idx += 1;
    }
    Ok(out)
}

/// Full in-order read of every pair in the file.
pub fn drain(path: &Path, pool: &mut BufPool) -> io::Result<Vec<(u64, u64)>> {
    let header = read_header(path, pool)?;
    let mut out = Vec::with_capacity(header.num_pairs as usize);
    for i in 0..header.num_pairs {
        out.push(pair_at(path, i, pool)?);
    }
    Ok(out)
}

/// The file's minimum key, from the header.
pub fn get_minimum(path: &Path, pool: &mut BufPool) -> io::Result<u64> {
    Ok(read_header(path, pool)?.min_key)
}

/// The file's maximum key, from the header.
pub fn get_maximum(path: &Path, pool: &mut BufPool) -> io::Result<u64> {
    Ok(read_header(path, pool)?.max_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> BufPool {
        BufPool::new(64, |id| id.page)
    }

    #[test]
    fn flush_then_point_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.DATA.L0.R0.I0");
        let pairs: Vec<(u64, u64)> = (0..1000).map(|i| (i, i * 2)).collect();
        flush(&path, &pairs).unwrap();

        let mut pool = pool();
        assert_eq!(get_from_file(&path, 500, &mut pool).unwrap(), Some(1000));
        assert_eq!(get_from_file(&path, 1000, &mut pool).unwrap(), None);
    }

    #[test]
    fn scan_is_inclusive_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.DATA.L0.R0.I0");
        let pairs: Vec<(u64, u64)> = (0..50).map(|i| (i * 2, i)).collect();
        flush(&path, &pairs).unwrap();

        let mut pool = pool();
        let got = scan_in_file(&path, 10, 20, &mut pool).unwrap();
        assert_eq!(got, vec![(10, 5), (12, 6), (14, 7), (16, 8), (18, 9), (20, 10)]);
    }

    #[test]
    fn drain_returns_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.DATA.L0.R0.I0");
        let pairs: Vec<(u64, u64)> = (0..600).map(|i| (i, i)).collect();
        flush(&path, &pairs).unwrap();

        let mut pool = pool();
        assert_eq!(drain(&path, &mut pool).unwrap(), pairs);
    }

    #[test]
    fn min_max_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.DATA.L0.R0.I0");
        flush(&path, &[(5, 50), (9, 90), (42, 420)]).unwrap();

        let mut pool = pool();
        assert_eq!(get_minimum(&path, &mut pool).unwrap(), 5);
        assert_eq!(get_maximum(&path, &mut pool).unwrap(), 42);
    }

    #[test]
    fn pairs_spanning_multiple_pages_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.DATA.L0.R0.I0");
        let pairs: Vec<(u64, u64)> = (0..5000).map(|i| (i, i + 1)).collect();
        flush(&path, &pairs).unwrap();

        let mut pool = pool();
        for &(k, v) in pairs.iter().step_by(317) {
            assert_eq!(get_from_file(&path, k, &mut pool).unwrap(), Some(v));
        }
    }
}
