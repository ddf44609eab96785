use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

/// Concurrent extendible hash table.
///
/// Serves as the buffer pool's page table (page id -> frame id) and doubles
/// as a general-purpose resizable map. One coarse mutex covers the whole
/// directory; buckets are plain entries in an arena so that directory slots
/// can alias a bucket without shared ownership.
pub struct ExtendibleHashTable<K, V> {
    inner: Mutex<Directory<K, V>>,
}

struct Directory<K, V> {
    global_depth: usize,
    bucket_size: usize,
    /// Slot i points at buckets[dir[i]]; slots alias when their low
    /// local_depth bits agree.
    dir: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

struct Bucket<K, V> {
    local_depth: usize,
    items: Vec<(K, V)>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a table whose buckets hold at most `bucket_size` entries
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");
        Self {
            inner: Mutex::new(Directory {
                global_depth: 0,
                bucket_size,
                dir: vec![0],
                buckets: vec![Bucket {
                    local_depth: 0,
                    items: Vec::new(),
                }],
            }),
        }
    }

    /// Look up the value stored under `key`
    pub fn find(&self, key: &K) -> Option<V> {
        let d = self.inner.lock();
        let bucket = &d.buckets[d.dir[d.slot_of(key)]];
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Insert `key -> value`, overwriting an existing entry for the same key.
    /// Splits the target bucket (doubling the directory when needed) until
    /// the entry fits.
    pub fn insert(&self, key: K, value: V) {
        let mut d = self.inner.lock();
        loop {
            let bi = d.dir[d.slot_of(&key)];

            if let Some(slot) = d.buckets[bi].items.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
                return;
            }
            if d.buckets[bi].items.len() < d.bucket_size {
                d.buckets[bi].items.push((key, value));
                return;
            }

            if d.buckets[bi].local_depth == d.global_depth {
                d.double_directory();
            }
            d.split_bucket(bi);
            // Retry: repeated splits terminate once the colliding entries
            // separate at the new depth.
        }
    }

    /// Remove the entry for `key`, reporting whether it was present.
    /// Buckets are never merged back.
    pub fn remove(&self, key: &K) -> bool {
        let mut d = self.inner.lock();
        let bi = d.dir[d.slot_of(key)];
        let bucket = &mut d.buckets[bi];
        if let Some(pos) = bucket.items.iter().position(|(k, _)| k == key) {
            bucket.items.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn global_depth(&self) -> usize {
        self.inner.lock().global_depth
    }

    pub fn local_depth(&self, dir_index: usize) -> usize {
        let d = self.inner.lock();
        d.buckets[d.dir[dir_index]].local_depth
    }

    pub fn num_buckets(&self) -> usize {
        self.inner.lock().buckets.len()
    }
}

impl<K, V> Directory<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn hash_of(key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as usize
    }

    fn slot_of(&self, key: &K) -> usize {
        Self::hash_of(key) & ((1 << self.global_depth) - 1)
    }

    /// Double the directory: slot i + old_len aliases the same bucket as
    /// slot i, so every existing bucket keeps its full slot set.
    fn double_directory(&mut self) {
        let old_len = self.dir.len();
        self.dir.extend_from_within(0..old_len);
        self.global_depth += 1;
    }

    /// Split bucket `bi` one level deeper and redistribute its entries.
    fn split_bucket(&mut self, bi: usize) {
        let new_depth = self.buckets[bi].local_depth + 1;
        debug_assert!(new_depth <= self.global_depth);
        self.buckets[bi].local_depth = new_depth;

        let ni = self.buckets.len();
        self.buckets.push(Bucket {
            local_depth: new_depth,
            items: Vec::new(),
        });

        // Slots that carried the old bucket and have the new depth bit set
        // now point at the new bucket.
        let high_bit = 1usize << (new_depth - 1);
        for slot in 0..self.dir.len() {
            if self.dir[slot] == bi && slot & high_bit != 0 {
                self.dir[slot] = ni;
            }
        }

        let items = std::mem::take(&mut self.buckets[bi].items);
        for (k, v) in items {
            let target = self.dir[self.slot_of(&k)];
            self.buckets[target].items.push((k, v));
        }
    }
}
