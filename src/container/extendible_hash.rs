//! Extendible hash table.
//!
//! A concurrent map that grows by splitting overflowing buckets along one
//! more hash bit at a time, doubling its directory only when a bucket's
//! local depth catches up with the global depth. The buffer pool uses it
//! as its page table (`PageId -> FrameId`).

use std::hash::{BuildHasher, Hash, RandomState};

use parking_lot::Mutex;
use tracing::trace;

/// A hash table with a dynamically growing directory of fixed-capacity
/// buckets.
///
/// The directory holds `2^global_depth` slots; a key's slot is the low
/// `global_depth` bits of its hash. Each bucket discriminates on
/// `local_depth <= global_depth` bits, so several slots may share one
/// bucket: exactly those whose low `local_depth` bits agree.
///
/// Inserting into a full bucket splits it along bit `local_depth`
/// (doubling the directory first if `local_depth == global_depth`) and
/// retries until the key fits, so `insert` never fails.
///
/// # Thread Safety
///
/// One mutex protects the whole directory; every operation takes it. The
/// hasher is generic (like `std::collections::HashMap`) so callers can pin
/// hash bits in tests; production code uses the default `RandomState`.
///
/// # Example
///
/// ```
/// use pagepool::container::ExtendibleHashTable;
///
/// let table: ExtendibleHashTable<u64, String> = ExtendibleHashTable::new(4);
/// table.insert(1, "one".to_string());
/// assert_eq!(table.find(&1), Some("one".to_string()));
/// assert!(table.remove(&1));
/// assert_eq!(table.find(&1), None);
/// ```
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    /// Maximum entries per bucket.
    bucket_size: usize,
    hasher: S,
    state: Mutex<Directory<K, V>>,
}

/// Directory state: slot table plus the bucket arena.
///
/// Slots store indices into `buckets` rather than shared handles; a split
/// reuses the overflowing bucket's arena slot for its bit-0 half and
/// appends the bit-1 half.
struct Directory<K, V> {
    global_depth: u32,
    /// `2^global_depth` entries, each an index into `buckets`.
    slots: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

struct Bucket<K, V> {
    depth: u32,
    items: Vec<(K, V)>,
}

impl<K: Hash + Eq, V> ExtendibleHashTable<K, V> {
    /// Creates a table whose buckets hold up to `bucket_size` entries.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_size` is 0.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> ExtendibleHashTable<K, V, S> {
    /// Creates a table using the given hasher.
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        assert!(bucket_size > 0, "bucket_size must be > 0");
        Self {
            bucket_size,
            hasher,
            state: Mutex::new(Directory {
                global_depth: 0,
                slots: vec![0],
                buckets: vec![Bucket {
                    depth: 0,
                    items: Vec::new(),
                }],
            }),
        }
    }

    /// Looks up the value stored under `key`.
    pub fn find(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let dir = self.state.lock();
        let slot = self.slot_of(key, dir.global_depth);
        dir.buckets[dir.slots[slot]]
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Inserts `value` under `key`, overwriting any existing entry.
    ///
    /// Splits the target bucket as many times as it takes for the key to
    /// fit; this never fails.
    pub fn insert(&self, key: K, value: V) {
        let mut dir = self.state.lock();
        loop {
            let slot = self.slot_of(&key, dir.global_depth);
            let bucket_idx = dir.slots[slot];
            let bucket = &mut dir.buckets[bucket_idx];

            if let Some(entry) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
                return;
            }
            if bucket.items.len() < self.bucket_size {
                bucket.items.push((key, value));
                return;
            }

            // Bucket is full: refine it along the next hash bit and retry.
            // The key may keep colliding into a full half, so this can
            // repeat.
            self.split(&mut dir, bucket_idx);
        }
    }

    /// Removes the entry stored under `key`. Returns whether one existed.
    pub fn remove(&self, key: &K) -> bool {
        let mut dir = self.state.lock();
        let slot = self.slot_of(key, dir.global_depth);
        let bucket_idx = dir.slots[slot];
        let items = &mut dir.buckets[bucket_idx].items;

        if let Some(pos) = items.iter().position(|(k, _)| k == key) {
            items.remove(pos);
            true
        } else {
            false
        }
    }

    /// Returns the number of hash bits the directory discriminates on.
    pub fn global_depth(&self) -> u32 {
        self.state.lock().global_depth
    }

    /// Returns the number of hash bits the bucket behind `dir_index`
    /// discriminates on.
    ///
    /// # Panics
    ///
    /// Panics if `dir_index` is out of range.
    pub fn local_depth(&self, dir_index: usize) -> u32 {
        let dir = self.state.lock();
        dir.buckets[dir.slots[dir_index]].depth
    }

    /// Returns the number of distinct buckets.
    pub fn num_buckets(&self) -> usize {
        self.state.lock().buckets.len()
    }

    /// Returns the total number of entries.
    pub fn len(&self) -> usize {
        let dir = self.state.lock();
        dir.buckets.iter().map(|b| b.items.len()).sum()
    }

    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot_of(&self, key: &K, global_depth: u32) -> usize {
        let mask = (1u64 << global_depth) - 1;
        (self.hasher.hash_one(key) & mask) as usize
    }

    /// Splits the bucket at `bucket_idx` along bit `local_depth`, growing
    /// the directory first if the bucket already discriminates on every
    /// directory bit.
    fn split(&self, dir: &mut Directory<K, V>, bucket_idx: usize) {
        let local_depth = dir.buckets[bucket_idx].depth;
        if local_depth == dir.global_depth {
            // Double the directory; each new slot mirrors the slot with
            // the same low global_depth bits.
            let old_len = dir.slots.len();
            dir.slots.extend_from_within(0..old_len);
            dir.global_depth += 1;
        }

        let mask = 1u64 << local_depth;
        let items = std::mem::take(&mut dir.buckets[bucket_idx].items);
        dir.buckets[bucket_idx].depth = local_depth + 1;

        let sibling_idx = dir.buckets.len();
        dir.buckets.push(Bucket {
            depth: local_depth + 1,
            items: Vec::new(),
        });

        // Partition the old entries by bit `local_depth` of their hash.
        for (k, v) in items {
            let target = if self.hasher.hash_one(&k) & mask != 0 {
                sibling_idx
            } else {
                bucket_idx
            };
            dir.buckets[target].items.push((k, v));
        }

        // Redirect every slot that referenced the old bucket according to
        // that slot's own bit `local_depth`.
        for (i, slot) in dir.slots.iter_mut().enumerate() {
            if *slot == bucket_idx && (i as u64) & mask != 0 {
                *slot = sibling_idx;
            }
        }

        trace!(
            bucket = bucket_idx,
            sibling = sibling_idx,
            depth = local_depth + 1,
            global_depth = dir.global_depth,
            "split bucket"
        );
    }
}
