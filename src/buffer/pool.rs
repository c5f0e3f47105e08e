//! Buffer pool manager.
//!
//! The pool is the front door for all page I/O: it owns the frame array,
//! the free list, the page table, and the replacer, and orchestrates them
//! to keep a bounded set of pages resident.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{debug, trace};

use super::error::BufferPoolError;
use super::frame::{Frame, FrameId, FrameMetadata};
use super::guard::{PageReadGuard, PageWriteGuard};
use super::replacer::Replacer;
use crate::container::ExtendibleHashTable;
use crate::disk::DiskManager;
use crate::page::PageId;

/// Bucket capacity of the page table's hash directory.
const BUCKET_SIZE: usize = 16;

/// Buffer pool manager: a page cache with pin counts, dirty tracking, and
/// a free/eviction pipeline.
///
/// The pool maintains a fixed number of frames (in-memory page slots) and
/// maps disk pages into them on demand. When every frame is occupied, the
/// replacement policy selects an unpinned victim for eviction; dirty
/// victims are written back first.
///
/// # Architecture
///
/// ```text
/// +-------------------+
/// |      Callers      |
/// +-------------------+
///          |
///          v
/// +-------------------+     +----------------------+
/// |    BufferPool     |---->| ExtendibleHashTable  |
/// |  (frames, pins)   |     |  (PageId -> FrameId) |
/// +-------------------+     +----------------------+
///          |                           |
///          v                           v
/// +-------------------+     +----------------------+
/// | DiskManager trait |     |  Replacer (LRU-K)    |
/// +-------------------+     +----------------------+
/// ```
///
/// # Thread Safety
///
/// - The metadata (pin counts, dirty flags, free list, replacer) lives
///   under one mutex; pin-count transitions and evictability changes are
///   atomic with respect to each other.
/// - The page table keeps its own latch and is only called while the
///   state lock is held; it never calls back into the pool.
/// - Frame bytes sit behind per-frame `RwLock`s that back the guards.
///
/// # Latch discipline
///
/// The state lock is never held across an await. Frame data locks are
/// acquired only after the state lock has been released (or, in the
/// `new_page` path, before it is taken), so state holders never block on
/// frame data and no cycle can form. Disk I/O happens with the state lock
/// released; every post-I/O step re-validates what it read before.
pub struct BufferPool<D: DiskManager, R: Replacer> {
    inner: BufferPoolInner<D, R>,
}

/// Internal state of the buffer pool, shared with the guards for unpin.
pub(super) struct BufferPoolInner<D: DiskManager, R: Replacer> {
    /// The underlying disk manager.
    disk: D,

    /// Frame array; each frame's bytes have their own lock.
    frames: Vec<Frame>,

    /// Page table: which frame currently holds which page.
    ///
    /// Called only under the state lock, but keeps its own latch so the
    /// introspection methods can read it without one.
    page_table: ExtendibleHashTable<PageId, FrameId>,

    /// Mutable metadata, protected by the state mutex.
    state: Mutex<PoolState<R>>,

    /// Number of frames in the pool.
    pool_size: usize,
}

/// Metadata protected by the state mutex.
struct PoolState<R> {
    /// Per-frame bookkeeping, indexed by `FrameId`.
    frame_metadata: Vec<FrameMetadata>,

    /// Frames that hold no page. Popped from the front.
    free_list: VecDeque<FrameId>,

    /// Replacement policy for selecting eviction victims.
    replacer: R,
}

impl<D: DiskManager, R: Replacer> BufferPool<D, R> {
    /// Creates a new buffer pool over `disk` with `pool_size` frames.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` is 0.
    pub fn new(disk: D, replacer: R, pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<_> = (0..pool_size).map(|_| Frame::new()).collect();
        let frame_metadata: Vec<_> = (0..pool_size).map(|_| FrameMetadata::new()).collect();
        let free_list: VecDeque<_> = (0..pool_size).collect();

        Self {
            inner: BufferPoolInner {
                disk,
                frames,
                page_table: ExtendibleHashTable::new(BUCKET_SIZE),
                state: Mutex::new(PoolState {
                    frame_metadata,
                    free_list,
                    replacer,
                }),
                pool_size,
            },
        }
    }

    /// Fetches a page for reading.
    ///
    /// On a hit the resident frame is pinned and returned directly; on a
    /// miss the page is read from disk into a free or evicted frame. The
    /// guard holds the pin until it is dropped.
    ///
    /// # Errors
    ///
    /// - `BufferPoolError::NoFreeFrames` if every frame is pinned
    /// - `BufferPoolError::PageNotFound` if the page does not exist on disk
    /// - `BufferPoolError::WritebackFailed` if freeing a frame required
    ///   writing back a dirty victim and every candidate's write failed
    pub async fn fetch_page(
        &self,
        page_id: PageId,
    ) -> Result<PageReadGuard<'_, D, R>, BufferPoolError> {
        let frame_id = self.inner.get_or_allocate_frame(page_id).await?;
        let data = self.inner.frames[frame_id].data.read().await;

        Ok(PageReadGuard {
            pool: &self.inner,
            frame_id,
            page_id,
            data,
        })
    }

    /// Fetches a page for modification.
    ///
    /// Same semantics as [`fetch_page`](Self::fetch_page), but the guard
    /// gives exclusive mutable access and marks the page dirty on first
    /// mutation.
    pub async fn fetch_page_mut(
        &self,
        page_id: PageId,
    ) -> Result<PageWriteGuard<'_, D, R>, BufferPoolError> {
        let frame_id = self.inner.get_or_allocate_frame(page_id).await?;
        let data = self.inner.frames[frame_id].data.write().await;

        Ok(PageWriteGuard {
            pool: &self.inner,
            frame_id,
            page_id,
            data,
            dirtied: false,
        })
    }

    /// Allocates a fresh page and pins it.
    ///
    /// The caller receives a zeroed page; nothing is read from disk. The
    /// frame is acquired before the page id so that a full pool does not
    /// leak ids.
    ///
    /// # Errors
    ///
    /// - `BufferPoolError::NoFreeFrames` if every frame is pinned
    /// - `BufferPoolError::Disk` if allocation fails
    /// - `BufferPoolError::WritebackFailed` if freeing a frame required
    ///   writing back a dirty victim and every candidate's write failed
    pub async fn new_page(&self) -> Result<PageWriteGuard<'_, D, R>, BufferPoolError> {
        let frame_id = self.inner.allocate_frame().await?;
        let mut data = self.inner.frames[frame_id].data.write().await;

        let page_id = match self.inner.disk.allocate_page().await {
            Ok(page_id) => page_id,
            Err(e) => {
                self.inner.state.lock().free_list.push_back(frame_id);
                return Err(e.into());
            }
        };
        data.zero();

        {
            let mut state = self.inner.state.lock();
            let meta = &mut state.frame_metadata[frame_id];
            meta.page_id = Some(page_id);
            meta.pin_count = 1;
            meta.is_dirty = false;
            state.replacer.record_access(frame_id);
            state.replacer.set_evictable(frame_id, false);
            self.inner.page_table.insert(page_id, frame_id);
        }
        trace!(page = ?page_id, frame = frame_id, "allocated new page");

        Ok(PageWriteGuard {
            pool: &self.inner,
            frame_id,
            page_id,
            data,
            dirtied: false,
        })
    }

    /// Writes a page's current bytes to disk and clears its dirty flag.
    ///
    /// The dirty flag is not a precondition: the bytes are written
    /// unconditionally. Pin state is untouched. Returns `false` without
    /// any effect for `PageId::INVALID` or a page that is not resident.
    ///
    /// # Errors
    ///
    /// Returns `BufferPoolError::Disk` if the write fails.
    pub async fn flush_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        if !page_id.is_valid() {
            return Ok(false);
        }

        let frame_id = {
            let _state = self.inner.state.lock();
            match self.inner.page_table.find(&page_id) {
                Some(frame_id) => frame_id,
                None => return Ok(false),
            }
        };

        // Hold the bytes while re-validating the mapping: the frame cannot
        // be reloaded with another page while we hold its data lock.
        let data = self.inner.frames[frame_id].data.read().await;
        {
            let _state = self.inner.state.lock();
            if self.inner.page_table.find(&page_id) != Some(frame_id) {
                // Evicted between lookup and lock; the eviction already
                // wrote the bytes back.
                return Ok(false);
            }
        }

        self.inner.disk.write_page(page_id, data.as_slice()).await?;
        debug!(page = ?page_id, frame = frame_id, "flushed page");

        let mut state = self.inner.state.lock();
        if state.frame_metadata[frame_id].page_id == Some(page_id) {
            state.frame_metadata[frame_id].is_dirty = false;
        }

        Ok(true)
    }

    /// Flushes every resident page, then syncs the disk.
    ///
    /// Idempotent: a second call with no intervening writes re-writes the
    /// same bytes.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; later pages stay unflushed.
    pub async fn flush_all(&self) -> Result<(), BufferPoolError> {
        let resident: Vec<PageId> = {
            let state = self.inner.state.lock();
            state
                .frame_metadata
                .iter()
                .filter_map(|meta| meta.page_id)
                .collect()
        };

        // flush_page re-validates each page; pages may move underneath us.
        for page_id in resident {
            self.flush_page(page_id).await?;
        }

        self.inner.disk.sync_all().await?;
        Ok(())
    }

    /// Drops a page from the pool and deallocates it on disk.
    ///
    /// Returns `true` vacuously if the page is not resident, `false` if it
    /// is resident but pinned. Otherwise the page is detached from the
    /// page table and the replacer, its frame is zeroed and returned to
    /// the free list, and the disk manager is told to deallocate the id.
    ///
    /// # Errors
    ///
    /// Returns `BufferPoolError::Disk` if deallocation fails.
    pub async fn delete_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        let frame_id = {
            let mut state = self.inner.state.lock();
            let Some(frame_id) = self.inner.page_table.find(&page_id) else {
                return Ok(true);
            };
            if state.frame_metadata[frame_id].pin_count > 0 {
                return Ok(false);
            }

            self.inner.page_table.remove(&page_id);
            state.replacer.remove(frame_id);
            state.frame_metadata[frame_id].reset();
            frame_id
        };

        // The frame is not yet on the free list, so nobody contends for
        // its bytes.
        self.inner.frames[frame_id].data.write().await.zero();
        self.inner.state.lock().free_list.push_back(frame_id);

        debug!(page = ?page_id, frame = frame_id, "deleted page");
        self.inner.disk.deallocate_page(page_id).await?;
        Ok(true)
    }

    /// Returns the number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    /// Returns the number of pages currently resident.
    pub fn page_count(&self) -> usize {
        self.inner.page_table.len()
    }

    /// Returns the number of resident, unpinned frames.
    pub fn evictable_count(&self) -> usize {
        self.inner.state.lock().replacer.size()
    }

    /// Returns the pin count of a page, or `None` if it is not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.inner.state.lock();
        let frame_id = self.inner.page_table.find(&page_id)?;
        Some(state.frame_metadata[frame_id].pin_count)
    }

    /// Returns whether a page is dirty, or `None` if it is not resident.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.inner.state.lock();
        let frame_id = self.inner.page_table.find(&page_id)?;
        Some(state.frame_metadata[frame_id].is_dirty)
    }
}

impl<D: DiskManager, R: Replacer> BufferPoolInner<D, R> {
    /// Resolves a page to a pinned frame, loading it from disk on a miss.
    ///
    /// # Concurrency Note
    ///
    /// Two tasks that miss on the same page may both allocate frames and
    /// perform the read. The loser of that race discards its frame and
    /// pins the winner's; wasteful but correct.
    async fn get_or_allocate_frame(&self, page_id: PageId) -> Result<FrameId, BufferPoolError> {
        // Fast path: the page is already resident.
        {
            let mut state = self.state.lock();
            if let Some(frame_id) = self.page_table.find(&page_id) {
                state.frame_metadata[frame_id].pin_count += 1;
                state.replacer.record_access(frame_id);
                state.replacer.set_evictable(frame_id, false);
                return Ok(frame_id);
            }
        }

        // Miss: take a frame and read the page into it.
        let frame_id = self.allocate_frame().await?;

        let read_result = {
            let mut data = self.frames[frame_id].data.write().await;
            self.disk.read_page(page_id, data.as_mut_slice()).await
        };
        if let Err(e) = read_result {
            // Return the frame so it is not leaked.
            self.state.lock().free_list.push_back(frame_id);
            return Err(e.into());
        }

        let mut state = self.state.lock();

        // Another task may have loaded this page while we were reading.
        if let Some(existing) = self.page_table.find(&page_id) {
            state.free_list.push_back(frame_id);
            state.frame_metadata[existing].pin_count += 1;
            state.replacer.record_access(existing);
            state.replacer.set_evictable(existing, false);
            return Ok(existing);
        }

        let meta = &mut state.frame_metadata[frame_id];
        meta.page_id = Some(page_id);
        meta.pin_count = 1;
        meta.is_dirty = false;
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);
        self.page_table.insert(page_id, frame_id);

        Ok(frame_id)
    }

    /// Acquires a blank frame: free list first, then eviction.
    async fn allocate_frame(&self) -> Result<FrameId, BufferPoolError> {
        {
            let state = self.state.lock();

            // Cheap full-pool check before consulting the replacer.
            if state.free_list.is_empty() && state.replacer.size() == 0 {
                return Err(BufferPoolError::NoFreeFrames);
            }
        }

        // Victims whose write-back failed in this call. They keep their
        // bytes and dirty flag but sit out the victim search so it cannot
        // spin on the same broken frame; they are re-registered with the
        // replacer before returning.
        let mut failed_victims: Vec<FrameId> = Vec::new();
        let mut first_error: Option<BufferPoolError> = None;

        let result = 'victims: loop {
            // Re-check the free list every round: a concurrent delete_page
            // may hand a frame back while an eviction is in flight.
            let (frame_id, victim_page) = {
                let mut state = self.state.lock();
                if let Some(frame_id) = state.free_list.pop_front() {
                    break 'victims Ok(frame_id);
                }
                let Some(frame_id) = state.replacer.evict() else {
                    break 'victims Err(first_error.take().unwrap_or(BufferPoolError::NoFreeFrames));
                };
                let victim_page = state.frame_metadata[frame_id]
                    .page_id
                    .expect("victim frame holds a page");
                (frame_id, victim_page)
            };

            // Write back until the frame stays clean, then detach it. The
            // state lock is released around disk I/O, so the frame's
            // identity, pin count, and dirty flag are re-checked after
            // every write.
            loop {
                {
                    let mut state = self.state.lock();
                    let meta = &mut state.frame_metadata[frame_id];
                    if meta.page_id != Some(victim_page) || meta.pin_count > 0 {
                        // Deleted or re-pinned while we were working;
                        // pick another victim.
                        continue 'victims;
                    }
                    if !meta.is_dirty {
                        meta.reset();
                        self.page_table.remove(&victim_page);
                        debug!(frame = frame_id, page = ?victim_page, "evicted frame");
                        break 'victims Ok(frame_id);
                    }
                }

                // The dirty flag is cleared only once the write has
                // succeeded. The data lock is held through the clear:
                // unpin runs while a write guard still holds this lock,
                // so no writer can re-dirty the frame in between.
                let data = self.frames[frame_id].data.read().await;
                match self.disk.write_page(victim_page, data.as_slice()).await {
                    Ok(()) => {
                        trace!(frame = frame_id, page = ?victim_page, "wrote back dirty victim");
                        let mut state = self.state.lock();
                        let meta = &mut state.frame_metadata[frame_id];
                        if meta.page_id == Some(victim_page) {
                            meta.is_dirty = false;
                        }
                    }
                    Err(e) => {
                        // The frame stays dirty with its bytes intact.
                        // Park it and try another victim; the caller's
                        // request should not fail with the victim's error
                        // while some other frame can still be freed.
                        debug!(
                            frame = frame_id,
                            page = ?victim_page,
                            error = %e,
                            "victim write-back failed"
                        );
                        failed_victims.push(frame_id);
                        if first_error.is_none() {
                            first_error = Some(BufferPoolError::WritebackFailed {
                                page_id: victim_page,
                                source: e,
                            });
                        }
                        continue 'victims;
                    }
                }
            }
        };

        if !failed_victims.is_empty() {
            let mut state = self.state.lock();
            for frame_id in failed_victims {
                // Skip frames that were deleted or pinned while parked;
                // a pinned frame re-enters the replacer on its unpin.
                let meta = &state.frame_metadata[frame_id];
                if meta.page_id.is_some() && meta.pin_count == 0 {
                    state.replacer.record_access(frame_id);
                    state.replacer.set_evictable(frame_id, true);
                }
            }
        }

        result
    }

    /// Unpins a frame; called from guard `Drop`, hence synchronous.
    pub(super) fn unpin(&self, frame_id: FrameId, dirtied: bool) {
        let mut state = self.state.lock();
        let meta = &mut state.frame_metadata[frame_id];

        if meta.pin_count > 0 {
            meta.pin_count -= 1;
            if dirtied {
                meta.is_dirty = true;
            }
            if meta.pin_count == 0 {
                state.replacer.set_evictable(frame_id, true);
            }
        }
    }
}
