//! Page replacement policies for the buffer pool.
//!
//! The replacer tracks access history for frames, knows which of them are
//! evictable, and nominates a victim when the pool needs a frame back.

use std::collections::{HashMap, VecDeque};

use super::frame::FrameId;

/// Trait for page replacement policies.
///
/// The pool owns its replacer and serializes access under its state mutex,
/// so implementations take `&mut self` and need no locking of their own.
///
/// # Usage
///
/// ```text
/// // On every pin (fetch hit or page install)
/// replacer.record_access(frame_id);
/// replacer.set_evictable(frame_id, false);
///
/// // When a page's pin count drops to 0
/// replacer.set_evictable(frame_id, true);
///
/// // When the pool needs a frame back
/// if let Some(victim) = replacer.evict() {
///     // Evict the victim frame
/// }
/// ```
pub trait Replacer: Send {
    /// Records that the given frame was accessed now.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is out of range for this replacer. An illegal
    /// frame id means the caller's state is corrupt.
    fn record_access(&mut self, frame_id: FrameId);

    /// Toggles whether a frame may be evicted.
    ///
    /// Adjusts the replacer's size when the flag actually changes. Has no
    /// effect on frames with no recorded accesses.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is out of range.
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool);

    /// Selects a victim among the evictable frames.
    ///
    /// Returns `None` if no frame is evictable. A successful eviction
    /// clears all recorded state for the returned frame.
    fn evict(&mut self) -> Option<FrameId>;

    /// Drops a specific frame from the replacer, clearing its history.
    ///
    /// Unlike `evict`, this ignores the replacement policy. No-op for
    /// frames with no recorded accesses.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is out of range, or if the frame is known and
    /// currently non-evictable (the pool only removes unpinned frames).
    fn remove(&mut self, frame_id: FrameId);

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// Recorded state for one frame.
struct FrameEntry {
    access_count: usize,
    evictable: bool,
}

/// LRU-K page replacement policy.
///
/// The victim is the evictable frame with the greatest *backward
/// k-distance*: the gap between now and the frame's k-th most recent
/// access. Frames with fewer than `k` accesses have infinite distance and
/// are evicted first, oldest first access first (classical LRU).
///
/// # Data Structure
///
/// Two queues stand in for explicit timestamps:
/// - **history**: frames with fewer than `k` accesses, most recent first
///   access at the front. A frame never moves while it is here, so the
///   back is the oldest first access.
/// - **cache**: frames with at least `k` accesses, moved to the front on
///   every access, so the back has the oldest k-th-most-recent access.
///
/// `evict` scans the history queue from the back, then the cache queue
/// from the back, skipping non-evictable frames.
///
/// # Example
///
/// ```
/// use pagepool::buffer::{LruKReplacer, Replacer};
///
/// let mut replacer = LruKReplacer::new(8, 2);
///
/// replacer.record_access(0);
/// replacer.record_access(1);
/// replacer.set_evictable(0, true);
/// replacer.set_evictable(1, true);
///
/// // Both have a single access; frame 0 entered history first.
/// assert_eq!(replacer.evict(), Some(0));
/// assert_eq!(replacer.evict(), Some(1));
/// assert_eq!(replacer.evict(), None);
/// ```
pub struct LruKReplacer {
    num_frames: usize,
    k: usize,
    entries: HashMap<FrameId, FrameEntry>,
    /// Frames with fewer than `k` accesses, most recent first access at
    /// the front.
    history: VecDeque<FrameId>,
    /// Frames with at least `k` accesses, most recent k-th access at the
    /// front.
    cache: VecDeque<FrameId>,
    /// Number of evictable frames.
    curr_size: usize,
}

impl LruKReplacer {
    /// Creates a replacer for frames `0..num_frames` with the given `k`.
    ///
    /// # Panics
    ///
    /// Panics if `k` is 0.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "k must be > 0");
        Self {
            num_frames,
            k,
            entries: HashMap::with_capacity(num_frames),
            history: VecDeque::new(),
            cache: VecDeque::new(),
            curr_size: 0,
        }
    }

    fn check_frame_id(&self, frame_id: FrameId) {
        assert!(
            frame_id < self.num_frames,
            "frame id {} out of range for replacer over {} frames",
            frame_id,
            self.num_frames
        );
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        self.check_frame_id(frame_id);

        let entry = self.entries.entry(frame_id).or_insert(FrameEntry {
            access_count: 0,
            evictable: false,
        });
        entry.access_count += 1;
        let count = entry.access_count;

        if count == self.k {
            // Graduates from history to cache.
            if let Some(pos) = self.history.iter().position(|&f| f == frame_id) {
                self.history.remove(pos);
            }
            self.cache.push_front(frame_id);
        } else if count > self.k {
            if let Some(pos) = self.cache.iter().position(|&f| f == frame_id) {
                self.cache.remove(pos);
            }
            self.cache.push_front(frame_id);
        } else if count == 1 {
            self.history.push_front(frame_id);
        }
        // 1 < count < k: the frame stays put, history is ordered by first
        // access.
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        self.check_frame_id(frame_id);

        let Some(entry) = self.entries.get_mut(&frame_id) else {
            return;
        };
        if entry.evictable != evictable {
            entry.evictable = evictable;
            if evictable {
                self.curr_size += 1;
            } else {
                self.curr_size -= 1;
            }
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        if self.curr_size == 0 {
            return None;
        }

        // Infinite backward k-distance dominates: history frames go first,
        // oldest first access at the back.
        if let Some(pos) = self.history.iter().rposition(|f| self.entries[f].evictable) {
            let frame_id = self.history.remove(pos).expect("rposition is in bounds");
            self.entries.remove(&frame_id);
            self.curr_size -= 1;
            return Some(frame_id);
        }

        // Then the cache queue, oldest k-th-most-recent access at the back.
        if let Some(pos) = self.cache.iter().rposition(|f| self.entries[f].evictable) {
            let frame_id = self.cache.remove(pos).expect("rposition is in bounds");
            self.entries.remove(&frame_id);
            self.curr_size -= 1;
            return Some(frame_id);
        }

        None
    }

    fn remove(&mut self, frame_id: FrameId) {
        self.check_frame_id(frame_id);

        let Some(entry) = self.entries.get(&frame_id) else {
            return;
        };
        assert!(
            entry.evictable,
            "remove called on non-evictable frame {}",
            frame_id
        );

        let queue = if entry.access_count >= self.k {
            &mut self.cache
        } else {
            &mut self.history
        };
        if let Some(pos) = queue.iter().position(|&f| f == frame_id) {
            queue.remove(pos);
        }

        self.entries.remove(&frame_id);
        self.curr_size -= 1;
    }

    fn size(&self) -> usize {
        self.curr_size
    }
}
