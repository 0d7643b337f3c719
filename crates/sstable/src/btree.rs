//! B-tree sorted-run format: a bottom-up-built on-disk B-tree over packed
//! `(key, value)` leaves, linked left-to-right for fast range scans.
//!
//! Page 0 is the header (`magic, type, num_pairs, min_key, max_key, root_page,
//! fanout`). Every subsequent page is either an internal node or a leaf; each
//! begins with a one-word tag (`LEAF_TAG` / `INTERNAL_TAG`) so a reader can
//! tell the two apart without consulting anything else.
//!
//! **Separator semantics (resolved open question):** an internal node's
//! `i`-th separator is the *maximum* key in its `i`-th child subtree. Descent
//! follows the child whose separator is the smallest one `>= key`; if `key`
//! exceeds every separator in the node, it follows the last child (there is
//! no subsequent sibling that could hold a larger key).
//!
//! Leaves are count-prefixed `(key, value)` arrays linked via a trailing
//! `next_page` word (`0` meaning "no next leaf" — page 0 is always the
//! header, so it can never be a real leaf's successor).

use crate::pagecache::{read_page, read_u64_le, write_u64_le};
use bufpool::BufPool;
use pagefile::{FileType, PAGE_SIZE};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

const HEADER_NUM_PAIRS_OFFSET: usize = 16;
const HEADER_MIN_KEY_OFFSET: usize = 24;
const HEADER_MAX_KEY_OFFSET: usize = 32;
const HEADER_ROOT_PAGE_OFFSET: usize = 40;
const HEADER_FANOUT_OFFSET: usize = 48;

const LEAF_TAG: u64 = 0;
const INTERNAL_TAG: u64 = 1;

/// Words available in a page after the one-word node tag.
const WORDS_PER_PAGE: usize = PAGE_SIZE / 8;

/// Max `(key, value)` pairs per leaf: `tag(1) + count(1) + 2*n + next(1) <=
/// WORDS_PER_PAGE`.
pub const LEAF_CAPACITY: usize = (WORDS_PER_PAGE - 3) / 2;

/// Max separators (and children) per internal node: `tag(1) + count(1) +
/// 2*n <= WORDS_PER_PAGE`.
pub const INTERNAL_FANOUT: usize = (WORDS_PER_PAGE - 2) / 2;

struct Header {
    num_pairs: u64,
    min_key: u64,
    max_key: u64,
    root_page: u64,
}

fn read_header(path: &Path, pool: &mut BufPool) -> io::Result<Header> {
    let page = read_page(path, 0, FileType::Data as u8, pool)?;
    Ok(Header {
        num_pairs: read_u64_le(&page, HEADER_NUM_PAIRS_OFFSET),
        min_key: read_u64_le(&page, HEADER_MIN_KEY_OFFSET),
        max_key: read_u64_le(&page, HEADER_MAX_KEY_OFFSET),
        root_page: read_u64_le(&page, HEADER_ROOT_PAGE_OFFSET),
    })
}

/// One planned leaf: its pairs and the separator (its own max key) that its
/// parent will carry.
struct PlannedLeaf {
    pairs: Vec<(u64, u64)>,
}

/// One planned internal node: its children's page indices plus the
/// separator (max key) of each child.
struct PlannedInternal {
    separators: Vec<u64>,
    children: Vec<u64>,
}

/// Writes a B-tree sorted-run file from an already key-sorted slice of pairs.
pub fn flush(path: &Path, pairs: &[(u64, u64)]) -> io::Result<()> {
    let leaves: Vec<PlannedLeaf> = if pairs.is_empty() {
        vec![PlannedLeaf { pairs: Vec::new() }]
    } else {
        pairs
            .chunks(LEAF_CAPACITY)
            .map(|c| PlannedLeaf { pairs: c.to_vec() })
            .collect()
    };

    // Page 1..=leaves.len() are leaves, in order.
    let mut next_page_idx = 1u64 + leaves.len() as u64;

    // Build internal levels bottom-up until exactly one node remains.
    // `current` holds (separator, page_idx) for leaves first, then for each
    // internal level built on top.
    let mut current: Vec<(u64, u64)> = leaves
        .iter()
        .enumerate()
        .map(|(i, leaf)| {
            let sep = leaf.pairs.last().map(|&(k, _)| k).unwrap_or(0);
            (sep, 1 + i as u64)
        })
        .collect();

    let mut internal_levels: Vec<Vec<PlannedInternal>> = Vec::new();
    while current.len() > 1 {
        let mut level_nodes = Vec::new();
        let mut next_level = Vec::new();
        for chunk in current.chunks(INTERNAL_FANOUT) {
            let separators: Vec<u64> = chunk.iter().map(|&(s, _)| s).collect();
            let children: Vec<u64> = chunk.iter().map(|&(_, p)| p).collect();
            let node_sep = *separators.last().unwrap();
            let node_page = next_page_idx;
            next_page_idx += 1;
            next_level.push((node_sep, node_page));
            level_nodes.push(PlannedInternal {
                separators,
                children,
            });
        }
        internal_levels.push(level_nodes);
        current = next_level;
    }

    let root_page = current[0].1;

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
    write_u64_le(&mut header, HEADER_ROOT_PAGE_OFFSET, root_page);
    write_u64_le(&mut header, HEADER_FANOUT_OFFSET, INTERNAL_FANOUT as u64);
    file.write_all(&header)?;

    for (i, leaf) in leaves.iter().enumerate() {
        let next_page = if i + 1 < leaves.len() {
            1 + (i as u64) + 1
        } else {
            0
        };
        let mut page = vec![0u8; PAGE_SIZE];
        write_u64_le(&mut page, 0, LEAF_TAG);
        write_u64_le(&mut page, 8, leaf.pairs.len() as u64);
        for (j, &(k, v)) in leaf.pairs.iter().enumerate() {
            let off = 16 + j * 16;
            write_u64_le(&mut page, off, k);
            write_u64_le(&mut page, off + 8, v);
        }
        write_u64_le(&mut page, 16 + LEAF_CAPACITY * 16, next_page);
        file.write_all(&page)?;
    }

    for level_nodes in &internal_levels {
        for node in level_nodes {
            let mut page = vec![0u8; PAGE_SIZE];
            write_u64_le(&mut page, 0, INTERNAL_TAG);
            write_u64_le(&mut page, 8, node.separators.len() as u64);
            for (j, &sep) in node.separators.iter().enumerate() {
                write_u64_le(&mut page, 16 + j * 8, sep);
            }
            let children_off = 16 + node.separators.len() * 8;
            for (j, &child) in node.children.iter().enumerate() {
                write_u64_le(&mut page, children_off + j * 8, child);
            }
            file.write_all(&page)?;
        }
    }

    Ok(())
}

fn read_leaf(path: &Path, page_idx: u64, pool: &mut BufPool) -> io::Result<(Vec<(u64, u64)>, u64)> {
    let page = read_page(path, page_idx, FileType::Data as u8, pool)?;
    let count = read_u64_le(&page, 8) as usize;
    let mut pairs = Vec::with_capacity(count);
    for j in 0..count {
        let off = 16 + j * 16;
        pairs.push((read_u64_le(&page, off), read_u64_le(&page, off + 8)));
    }
    let next_page = read_u64_le(&page, 16 + LEAF_CAPACITY * 16);
    Ok((pairs, next_page))
}

fn read_internal(path: &Path, page_idx: u64, pool: &mut BufPool) -> io::Result<(Vec<u64>, Vec<u64>)> {
    let page = read_page(path, page_idx, FileType::Data as u8, pool)?;
    let count = read_u64_le(&page, 8) as usize;
    let mut separators = Vec::with_capacity(count);
    for j in 0..count {
        separators.push(read_u64_le(&page, 16 + j * 8));
    }
    let children_off = 16 + count * 8;
    let mut children = Vec::with_capacity(count);
    for j in 0..count {
        children.push(read_u64_le(&page, children_off + j * 8));
    }
    Ok((separators, children))
}

fn is_leaf(path: &Path, page_idx: u64, pool: &mut BufPool) -> io::Result<bool> {
    let page = read_page(path, page_idx, FileType::Data as u8, pool)?;
    Ok(read_u64_le(&page, 0) == LEAF_TAG)
}

/// Descends from `page_idx` to the leaf that would contain `key`, following
/// the smallest-separator->=key child at each internal node.
fn descend_to_leaf(path: &Path, mut page_idx: u64, key: u64, pool: &mut BufPool) -> io::Result<u64> {
    loop {
        if is_leaf(path, page_idx, pool)? {
            return Ok(page_idx);
        }
        let (separators, children) = read_internal(path, page_idx, pool)?;
        let child_ix = separators
            .iter()
            .position(|&s| s >= key)
            .unwrap_or(separators.len() - 1);
        page_idx = children[child_ix];
    }
}

/// Descends from the root to the leftmost leaf whose range could contain
/// `lo` (i.e. the first leaf whose max key is `>= lo`, or the last leaf if
/// `lo` exceeds every key in the tree).
fn descend_to_first_leaf_for_scan(
    path: &Path,
    root_page: u64,
    lo: u64,
    pool: &mut BufPool,
) -> io::Result<u64> {
    descend_to_leaf(path, root_page, lo, pool)
}

/// Point lookup. Returns `None` if `key` is out of the file's range or not
/// found in its leaf.
pub fn get_from_file(path: &Path, key: u64, pool: &mut BufPool) -> io::Result<Option<u64>> {
    let header = read_header(path, pool)?;
    if header.num_pairs == 0 || key < header.min_key || key > header.max_key {
        return Ok(None);
    }

    let leaf_page = descend_to_leaf(path, header.root_page, key, pool)?;
    let (pairs, _) = read_leaf(path, leaf_page, pool)?;
    match pairs.binary_search_by_key(&key, |&(k, _)| k) {
        Ok(idx) => Ok(Some(pairs[idx].1)),
        Err(_) => Ok(None),
    }
}

/// Range scan `[lo, hi]` inclusive, ascending key order.
pub fn scan_in_file(path: &Path, lo: u64, hi: u64, pool: &mut BufPool) -> io::Result<Vec<(u64, u64)>> {
    let header = read_header(path, pool)?;
    if header.num_pairs == 0 || lo > header.max_key || hi < header.min_key {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    let mut page_idx = descend_to_first_leaf_for_scan(path, header.root_page, lo, pool)?;
    loop {
        let (pairs, next_page) = read_leaf(path, page_idx, pool)?;
        let mut done = false;
        for (k, v) in pairs {
            if k < lo {
                continue;
            }
            if k > hi {
                done = true;
                break;
            }
            out.push((k, v));
        }
        if done || next_page == 0 {
            break;
        }
        page_idx = next_page;
    }
    Ok(out)
}

/// Full in-order read of every pair in the file, following leaf links from
/// the first leaf.
pub fn drain(path: &Path, pool: &mut BufPool) -> io::Result<Vec<(u64, u64)>> {
    let header = read_header(path, pool)?;
    let mut out = Vec::with_capacity(header.num_pairs as usize);
    if header.num_pairs == 0 {
        return Ok(out);
    }

    let mut page_idx = first_leaf_page(path, header.root_page, pool)?;
    loop {
        let (pairs, next_page) = read_leaf(path, page_idx, pool)?;
        out.extend(pairs);
        if next_page == 0 {
            break;
        }
        page_idx = next_page;
    }
    Ok(out)
}

fn first_leaf_page(path: &Path, mut page_idx: u64, pool: &mut BufPool) -> io::Result<u64> {
    loop {
        if is_leaf(path, page_idx, pool)? {
            return Ok(page_idx);
        }
        let (_, children) = read_internal(path, page_idx, pool)?;
        page_idx = children[0];
    }
}

/// The file's minimum key, from the header.
pub fn get_minimum(path: &Path, pool: &mut BufPool) -> io::Result<u64> {
    Ok(read_header(path, pool)?.min_key)
}

/// The file's maximum key, from the header.
pub fn get_maximum(path: &Path, pool: &mut BufPool) -> io::Result<u64> {
    Ok(read_header(path, pool)?.max_key)
}
