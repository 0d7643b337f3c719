//! # Bloom Filter
//!
//! A space-efficient probabilistic data structure for set membership testing,
//! specialized to the engine's fixed `u64` keys.
//!
//! A bloom filter can tell you with certainty that a key is **not** in the
//! set (no false negatives), but may occasionally report that a key **is**
//! in the set when it isn't. To keep lookups cache-friendly this is a
//! *blocked* bloom filter: each key hashes to exactly one cache-line-sized
//! block, and all `k` bit tests for that key land inside that single block,
//! instead of scattering across the whole bit array.
//!
//! ## Usage
//!
//! Each sorted run embeds a filter built from its keys at flush time. During
//! point lookups the engine checks the filter first — if it says "not
//! present", the run is skipped entirely, avoiding a disk seek.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bloom::BlockedBloomFilter;
//!
//! let mut bf = BlockedBloomFilter::new(1000, 0);
//! bf.insert(42);
//! assert!(bf.may_contain(42));
//! ```
use std::io::{self, Read, Write};

/// Target bits of filter state per entry inserted (`m/n`), used only to size
/// the number of blocks at construction.
pub const BITS_PER_ENTRY: usize = 10;

/// Number of independent bit-hash functions consulted per key.
pub const NUM_HASH_FUNCS: usize = 7;

/// Bits per block. A block is exactly one cache line (128 bytes).
pub const BLOCK_BITS: usize = 1024;

/// Entries-per-cache-line figure used to size the number of blocks; kept as
/// a named constant because it appears in the engine's own block-sizing
/// arithmetic, not because this crate divides anything by it internally.
pub const ENTRIES_PER_CACHE_LINE: usize = 16;

const WORDS_PER_BLOCK: usize = BLOCK_BITS / 64;

/// A blocked bloom filter over `u64` keys.
///
/// Each block is a fixed 1024-bit (16 x `u64`) bitset. A key is routed to
/// exactly one block via `block_hash`, then tests/sets [`NUM_HASH_FUNCS`]
/// bits within that block via `bit_hash(.., i)` for `i` in `0..NUM_HASH_FUNCS`.
/// All hashing is xxHash64, each hash function distinguished by its seed.
pub struct BlockedBloomFilter {
    seed: u64,
    blocks: Vec<[u64; WORDS_PER_BLOCK]>,
}

impl BlockedBloomFilter {
    /// Creates a filter sized for `max_entries` keys, seeded with `seed`.
    ///
    /// The number of blocks is `ceil(max_entries / ENTRIES_PER_CACHE_LINE)`,
    /// with a floor of 1 block so an empty or tiny filter is still valid.
    pub fn new(max_entries: usize, seed: u64) -> Self {
        let num_blocks = max_entries.div_ceil(ENTRIES_PER_CACHE_LINE).max(1);
        Self {
            seed,
            blocks: vec![[0u64; WORDS_PER_BLOCK]; num_blocks],
        }
    }

    /// Inserts `key` into the set.
    pub fn insert(&mut self, key: u64) {
        let block = self.block_for(key);
        for i in 0..NUM_HASH_FUNCS {
            let bit = self.bit_hash(key, i);
            set_bit(&mut self.blocks[block], bit);
        }
    }

    /// Returns `true` if `key` **might** be in the set, `false` if it is
    /// **definitely not**.
    #[must_use]
    pub fn may_contain(&self, key: u64) -> bool {
        let block = self.block_for(key);
        for i in 0..NUM_HASH_FUNCS {
            let bit = self.bit_hash(key, i);
            if !test_bit(&self.blocks[block], bit) {
                return false;
            }
        }
        true
    }

    /// Number of blocks backing this filter.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// The seed this filter was constructed with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Size of the serialized filter in bytes: `seed(u64) + num_blocks(u64) +
    /// num_blocks * 128 bytes`.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        16 + self.blocks.len() * WORDS_PER_BLOCK * 8
    }

    /// Serializes the filter.
    ///
    /// Wire format (all little-endian):
    /// ```text
    /// [seed: u64][num_blocks: u64][block_0: 16 x u64]...[block_{n-1}: 16 x u64]
    /// ```
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.seed.to_le_bytes())?;
        w.write_all(&(self.blocks.len() as u64).to_le_bytes())?;
        for block in &self.blocks {
            for word in block {
                w.write_all(&word.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Deserializes a filter previously written with [`write_to`](Self::write_to).
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];

        r.read_exact(&mut buf8)?;
        let seed = u64::from_le_bytes(buf8);

        r.read_exact(&mut buf8)?;
        let num_blocks = u64::from_le_bytes(buf8) as usize;

        const MAX_BLOCKS: usize = 64 * 1024 * 1024;
        if num_blocks == 0 || num_blocks > MAX_BLOCKS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("implausible filter block count: {}", num_blocks),
            ));
        }

        let mut blocks = Vec::with_capacity(num_blocks);
        for _ in 0..num_blocks {
            let mut block = [0u64; WORDS_PER_BLOCK];
            for word in &mut block {
                r.read_exact(&mut buf8)?;
                *word = u64::from_le_bytes(buf8);
            }
            blocks.push(block);
        }

        Ok(Self { seed, blocks })
    }

    // ---- Internal helpers ----

    fn block_for(&self, key: u64) -> usize {
        (xxhash_rust::xxh64::xxh64(&key.to_le_bytes(), self.seed) as usize) % self.blocks.len()
    }

    /// Bit hash function `i`, matching the source engine's
    /// `XXH64(key, seed + (i + 1) + 1)` seeding.
    fn bit_hash(&self, key: u64, i: usize) -> usize {
        let hash_seed = self.seed.wrapping_add(i as u64).wrapping_add(2);
        (xxhash_rust::xxh64::xxh64(&key.to_le_bytes(), hash_seed) as usize) % BLOCK_BITS
    }
}

impl std::fmt::Debug for BlockedBloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockedBloomFilter")
            .field("seed", &self.seed)
            .field("num_blocks", &self.blocks.len())
            .finish()
    }
}

fn set_bit(block: &mut [u64; WORDS_PER_BLOCK], bit: usize) {
    block[bit / 64] |= 1u64 << (bit % 64);
}

fn test_bit(block: &[u64; WORDS_PER_BLOCK], bit: usize) -> bool {
    (block[bit / 64] >> (bit % 64)) & 1 == 1
}

/// Builds a filter from a run's keys and writes it to `path`, preceded by
/// the standard page-0 header so the file is self-describing on disk.
pub fn write_filter_file(
    path: &std::path::Path,
    keys: impl IntoIterator<Item = u64>,
    seed: u64,
) -> io::Result<()> {
    let keys: Vec<u64> = keys.into_iter().collect();
    let mut filter = BlockedBloomFilter::new(keys.len().max(1), seed);
    for key in keys {
        filter.insert(key);
    }

    let mut file = std::fs::File::create(path)?;
    pagefile::write_header(&mut file, pagefile::FileType::Filter)?;
    filter.write_to(&mut file)?;

    let written = 16 + filter.serialized_size();
    let padded = pagefile::pages_for_bytes(written) * pagefile::PAGE_SIZE;
    if padded > written {
        file.write_all(&vec![0u8; padded - written])?;
    }
    Ok(())
}

/// Reads a filter file written by [`write_filter_file`] and tests `key`
/// against it.
pub fn read_filter_file(path: &std::path::Path, key: u64) -> io::Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let file_type = pagefile::read_header(&mut file)?;
    if file_type != pagefile::FileType::Filter {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "not a filter file",
        ));
    }
    let filter = BlockedBloomFilter::read_from(&mut file)?;
    Ok(filter.may_contain(key))
}
