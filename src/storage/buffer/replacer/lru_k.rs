use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::types::FrameId;

/// LRU-K replacement policy over buffer pool frame slots.
///
/// Tracks the last K access timestamps per frame. Frames with fewer than K
/// recorded accesses have infinite backward K-distance and are evicted
/// first; ties within either class break on the oldest retained timestamp.
pub struct LruKReplacer {
    inner: Mutex<ReplacerState>,
}

struct ReplacerState {
    k: usize,
    replacer_size: usize,
    current_timestamp: u64,
    entries: HashMap<FrameId, FrameEntry>,
}

struct FrameEntry {
    /// Last K access timestamps, oldest at the front
    history: VecDeque<u64>,
    evictable: bool,
}

impl FrameEntry {
    fn has_k_accesses(&self, k: usize) -> bool {
        self.history.len() >= k
    }

    /// Oldest retained timestamp: for a full history this is the
    /// Kth-most-recent access, otherwise the first access seen.
    fn backward_timestamp(&self) -> u64 {
        self.history.front().copied().unwrap_or(0)
    }
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            inner: Mutex::new(ReplacerState {
                k,
                replacer_size: num_frames,
                current_timestamp: 0,
                entries: HashMap::with_capacity(num_frames),
            }),
        }
    }

    /// Record an access to `frame_id`, creating its entry (non-evictable)
    /// if absent. Only the last K timestamps are retained.
    pub fn record_access(&self, frame_id: FrameId) {
        let mut state = self.inner.lock();
        state.current_timestamp += 1;
        let ts = state.current_timestamp;
        let k = state.k;

        let entry = state.entries.entry(frame_id).or_insert_with(|| FrameEntry {
            history: VecDeque::with_capacity(k),
            evictable: false,
        });
        entry.history.push_back(ts);
        if entry.history.len() > k {
            entry.history.pop_front();
        }

        debug_assert!(state.entries.len() <= state.replacer_size);
    }

    /// Flip the evictable flag of a tracked frame
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut state = self.inner.lock();
        state.current_timestamp += 1;
        if let Some(entry) = state.entries.get_mut(&frame_id) {
            entry.evictable = evictable;
        }
    }

    /// Choose and remove the victim frame, or None when nothing is evictable
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.inner.lock();
        state.current_timestamp += 1;
        let k = state.k;

        let victim = state
            .entries
            .iter()
            .filter(|(_, e)| e.evictable)
            .min_by_key(|(_, e)| (e.has_k_accesses(k), e.backward_timestamp()))
            .map(|(&fid, _)| fid)?;

        state.entries.remove(&victim);
        Some(victim)
    }

    /// Drop a frame's entry entirely.
    ///
    /// Panics when the frame is tracked but not evictable; callers must
    /// only remove unpinned frames.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.inner.lock();
        state.current_timestamp += 1;
        if let Some(entry) = state.entries.get(&frame_id) {
            if !entry.evictable {
                panic!("remove called on non-evictable frame {}", frame_id);
            }
            state.entries.remove(&frame_id);
        }
    }

    /// Number of frames currently evictable
    pub fn size(&self) -> usize {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.evictable)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evict_order_follows_kth_access() {
        let replacer = LruKReplacer::new(7, 2);

        // First round of accesses, frames 1..=6
        for f in 1..=6 {
            replacer.record_access(f);
        }
        for f in 1..=5 {
            replacer.set_evictable(f, true);
        }
        replacer.set_evictable(6, false);
        assert_eq!(replacer.size(), 5);

        // Second round gives every frame a full history; frame 1 gets a third
        // access so its retained window is the most recent.
        for f in 1..=6 {
            replacer.record_access(f);
        }
        replacer.record_access(1);

        // All candidates have K accesses; victims order by the older of the
        // two retained timestamps.
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(3));
        assert_eq!(replacer.evict(), Some(4));
        assert_eq!(replacer.evict(), Some(5));
        // Frame 1 has the freshest window, frame 6 is pinned.
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_infinite_distance_preferred() {
        let replacer = LruKReplacer::new(4, 2);

        replacer.record_access(1);
        replacer.record_access(1); // full history
        replacer.record_access(2); // single access: infinite distance
        replacer.record_access(3);
        replacer.record_access(3);

        for f in 1..=3 {
            replacer.set_evictable(f, true);
        }

        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(3));
    }

    #[test]
    fn test_infinite_distance_ties_break_on_first_access() {
        let replacer = LruKReplacer::new(4, 3);

        replacer.record_access(10);
        replacer.record_access(20);
        replacer.record_access(20);
        replacer.set_evictable(10, true);
        replacer.set_evictable(20, true);

        // Both below K accesses; frame 10 was seen first.
        assert_eq!(replacer.evict(), Some(10));
        assert_eq!(replacer.evict(), Some(20));
    }

    #[test]
    fn test_non_evictable_never_victim() {
        let replacer = LruKReplacer::new(3, 2);
        replacer.record_access(1);
        replacer.record_access(2);
        replacer.set_evictable(1, false);
        replacer.set_evictable(2, true);

        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_remove_evictable_frame() {
        let replacer = LruKReplacer::new(3, 2);
        replacer.record_access(1);
        replacer.set_evictable(1, true);
        replacer.remove(1);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
        // Removing an untracked frame is a no-op
        replacer.remove(9);
    }

    #[test]
    #[should_panic(expected = "non-evictable")]
    fn test_remove_pinned_frame_panics() {
        let replacer = LruKReplacer::new(3, 2);
        replacer.record_access(1);
        replacer.remove(1);
    }

    #[test]
    fn test_reaccess_after_evict_starts_fresh() {
        let replacer = LruKReplacer::new(3, 2);
        replacer.record_access(1);
        replacer.record_access(1);
        replacer.set_evictable(1, true);
        assert_eq!(replacer.evict(), Some(1));

        // Frame 1 re-enters with a single access: infinite distance again
        replacer.record_access(2);
        replacer.record_access(2);
        replacer.record_access(1);
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);
        assert_eq!(replacer.evict(), Some(1));
    }
}
