//! Frame slots for the buffer pool.
//!
//! A frame is an in-memory slot that holds one page at a time. Frame ids
//! are dense indices `0..pool_size`, stable for the pool's lifetime; which
//! page a frame holds changes as pages are loaded and evicted.

use tokio::sync::RwLock;

use crate::page::{PageData, PageId};

/// Index of a frame in the buffer pool, in `0..pool_size`.
///
/// Distinct from [`PageId`]: a `PageId` names a logical page on disk, a
/// `FrameId` names a physical memory slot.
pub type FrameId = usize;

/// A frame's byte buffer.
///
/// The bytes sit behind their own `tokio::sync::RwLock` so page guards can
/// hold shared or exclusive access across awaits, independently of the
/// pool's metadata lock.
pub(super) struct Frame {
    pub(super) data: RwLock<PageData>,
}

impl Frame {
    pub(super) fn new() -> Self {
        Self {
            data: RwLock::new(PageData::new()),
        }
    }
}

/// Bookkeeping for one frame, kept under the pool's state mutex.
///
/// # Lifecycle
///
/// 1. **Free**: `page_id = None`, frame id is in the free list
/// 2. **Loaded**: page installed, `pin_count = 1`
/// 3. **Pinned**: `pin_count > 0`, page cannot be evicted
/// 4. **Evictable**: `pin_count = 0`, the replacer may pick it
/// 5. **Evicted**: written back if dirty, then reset
pub(super) struct FrameMetadata {
    /// The page currently loaded in this frame, if any.
    pub(super) page_id: Option<PageId>,

    /// Number of outstanding guards on this frame.
    ///
    /// A frame cannot be evicted while `pin_count > 0`.
    pub(super) pin_count: u32,

    /// Whether the bytes have diverged from the on-disk image.
    ///
    /// Dirty frames must be written back before eviction. The flag is
    /// monotonic between flushes: a clean unpin never clears it.
    pub(super) is_dirty: bool,
}

impl FrameMetadata {
    pub(super) fn new() -> Self {
        Self {
            page_id: None,
            pin_count: 0,
            is_dirty: false,
        }
    }

    /// Returns the frame to the empty state.
    pub(super) fn reset(&mut self) {
        self.page_id = None;
        self.pin_count = 0;
        self.is_dirty = false;
    }
}
