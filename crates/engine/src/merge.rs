//! The k-way merge shared by compaction and multi-run `Scan`.
//!
//! Grounded in spec §4.10's merge algorithm and the extended
//! [`sstable::MinHeap`]'s newest-wins tie-break: seed the heap with one
//! stream per input, repeatedly extract the smallest `(key, stream)`, feed
//! the next element of that stream back in, and suppress every older
//! duplicate of a key as soon as a newer one has been emitted. Tombstones
//! are dropped only when `drop_tombstones` is set — true at the final
//! compaction level, false everywhere a caller still needs to see the
//! deletion marker (e.g. a mid-level compaction output, where a later level
//! may still hold the tombstoned key).

use pagefile::TOMBSTONE;
use sstable::MinHeap;

/// One already-sorted, ascending-key stream of pairs, oldest data first.
///
/// Streams must be supplied oldest-to-newest: the heap's tie-break favors
/// the *largest* stream index on equal keys, so the newest stream must sit
/// last for "newest wins" to hold.
pub fn k_way_merge_streams(streams: Vec<Vec<(u64, u64)>>, drop_tombstones: bool) -> Vec<(u64, u64)> {
    let mut cursors = vec![0usize; streams.len()];

    // MinHeap::new tags each initial key by its *position* in the iterator,
    // which would misassign stream indices once an empty stream is skipped —
    // so streams are seeded one at a time via `insert` instead.
    let mut heap = MinHeap::empty();
    for (i, stream) in streams.iter().enumerate() {
        if let Some(&(k, _)) = stream.first() {
            heap.insert((k, i as u32));
        }
    }

    let mut out: Vec<(u64, u64)> = Vec::new();
    while let Some((key, stream_idx)) = heap.extract() {
        let idx = stream_idx as usize;
        let value = streams[idx][cursors[idx]].1;
        cursors[idx] += 1;

        if let Some(&(next_key, _)) = streams[idx].get(cursors[idx]) {
            heap.insert((next_key, stream_idx));
        }

        // Drop older duplicates of the key just emitted: since ties favor
        // the higher stream index, the first extraction of a key is always
        // its newest value, and every subsequent extraction of the same key
        // from the heap is a stale duplicate to discard.
        if out.last().map(|&(k, _)| k) == Some(key) {
            continue;
        }

        if drop_tombstones && value == TOMBSTONE {
            continue;
        }
        out.push((key, value));
    }
    out
}
