//! Integration tests for BufferPool.
//!
//! These tests verify the buffer pool behavior with both MemoryDisk and
//! FileDisk backends, including concurrent access patterns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pagepool::{
    BufferPool, BufferPoolError, DiskError, DiskManager, FileDisk, FrameId, LruKReplacer,
    MemoryDisk, PAGE_SIZE, PageId, Replacer,
};
use tempfile::tempdir;

fn lru_k(pool_size: usize) -> LruKReplacer {
    LruKReplacer::new(pool_size, 2)
}

/// Generic test runner for buffer pool operations.
async fn test_buffer_pool_basic<D: DiskManager>(disk: D) {
    let bpm = BufferPool::new(disk, lru_k(10), 10);

    // Allocate a page and write through the guard.
    let page_id;
    {
        let mut guard = bpm.new_page().await.unwrap();
        page_id = guard.page_id();
        assert_eq!(guard.data().len(), PAGE_SIZE);

        guard.data_mut()[0..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    // Flush to disk.
    assert!(bpm.flush_page(page_id).await.unwrap());

    // Fetch and verify.
    {
        let guard = bpm.fetch_page(page_id).await.unwrap();
        assert_eq!(&guard.data()[0..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }
}

#[tokio::test]
async fn test_buffer_pool_with_memory_disk() {
    test_buffer_pool_basic(MemoryDisk::new()).await;
}

#[tokio::test]
async fn test_buffer_pool_with_file_disk() {
    let dir = tempdir().unwrap();
    let disk = FileDisk::open(dir.path().join("test.db")).await.unwrap();
    test_buffer_pool_basic(disk).await;
}

/// Eviction writes dirty pages back before reusing their frames.
async fn test_eviction_writes_back<D: DiskManager>(disk: D) {
    let bpm = BufferPool::new(disk, lru_k(2), 2); // Small pool to force eviction

    let mut page_ids = Vec::new();
    for value in 100u8..103 {
        let mut guard = bpm.new_page().await.unwrap();
        guard.data_mut()[0] = value;
        page_ids.push(guard.page_id());
    }

    // Three pages through two frames: at least one was evicted dirty.
    for (i, &page_id) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page(page_id).await.unwrap();
        assert_eq!(guard.data()[0], 100 + i as u8);
    }
}

#[tokio::test]
async fn test_eviction_with_memory_disk() {
    test_eviction_writes_back(MemoryDisk::new()).await;
}

#[tokio::test]
async fn test_eviction_with_file_disk() {
    let dir = tempdir().unwrap();
    let disk = FileDisk::open(dir.path().join("test.db")).await.unwrap();
    test_eviction_writes_back(disk).await;
}

/// Unmodified pages survive a round trip through fetch/unpin/fetch.
#[tokio::test]
async fn test_clean_refetch_observes_same_bytes() {
    let disk = MemoryDisk::new();
    let page_id = disk.allocate_page().await.unwrap();
    let mut buf = vec![0u8; PAGE_SIZE];
    buf[100] = 55;
    disk.write_page(page_id, &buf).await.unwrap();

    let bpm = BufferPool::new(disk, lru_k(4), 4);

    let first: Vec<u8> = bpm.fetch_page(page_id).await.unwrap().to_vec();
    let second: Vec<u8> = bpm.fetch_page(page_id).await.unwrap().to_vec();
    assert_eq!(first, second);
    assert_eq!(second[100], 55);
}

/// Concurrent read access to the same page.
#[tokio::test]
async fn test_concurrent_read_access() {
    let disk = MemoryDisk::new();
    let page_id = disk.allocate_page().await.unwrap();

    let mut buf = vec![0u8; PAGE_SIZE];
    buf[0] = 42;
    disk.write_page(page_id, &buf).await.unwrap();

    let bpm = Arc::new(BufferPool::new(disk, lru_k(10), 10));

    let mut handles = vec![];
    for _ in 0..10 {
        let bpm = Arc::clone(&bpm);
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                let guard = bpm.fetch_page(page_id).await.unwrap();
                assert_eq!(guard.data()[0], 42);
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}

/// Concurrent access to different pages, with more pages than frames.
#[tokio::test]
async fn test_concurrent_access_with_eviction() {
    let disk = MemoryDisk::new();
    for i in 0..16 {
        let page_id = disk.allocate_page().await.unwrap();
        let mut buf = vec![0u8; PAGE_SIZE];
        buf[0] = i as u8;
        disk.write_page(page_id, &buf).await.unwrap();
    }

    // 8 frames serving 16 pages: half the fetches miss and evict. Each
    // worker holds at most one pin, so a victim always exists.
    let bpm = Arc::new(BufferPool::new(disk, lru_k(8), 8));

    let mut handles = vec![];
    for w in 0..8u64 {
        let bpm = Arc::clone(&bpm);
        handles.push(tokio::spawn(async move {
            for iter in 0..50u64 {
                let page_num = (w + iter) % 16;
                let guard = bpm.fetch_page(PageId::new(page_num)).await.unwrap();
                assert_eq!(guard.data()[0], page_num as u8);
                drop(guard);
                tokio::task::yield_now().await;
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}

/// NoFreeFrames is returned when all frames are pinned.
#[tokio::test]
async fn test_no_free_frames_error() {
    let disk = MemoryDisk::new();
    for _ in 0..5 {
        disk.allocate_page().await.unwrap();
    }

    let bpm = BufferPool::new(disk, lru_k(3), 3);

    let guard0 = bpm.fetch_page(PageId::new(0)).await.unwrap();
    let _guard1 = bpm.fetch_page(PageId::new(1)).await.unwrap();
    let _guard2 = bpm.fetch_page(PageId::new(2)).await.unwrap();

    let result = bpm.fetch_page(PageId::new(3)).await;
    assert!(matches!(result, Err(BufferPoolError::NoFreeFrames)));

    // Releasing one pin unblocks the pool.
    drop(guard0);
    assert!(bpm.fetch_page(PageId::new(3)).await.is_ok());
}

/// flush_all persists every resident page across a reopen.
#[tokio::test]
async fn test_flush_all_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flush_all_test.db");

    {
        let disk = FileDisk::open(&path).await.unwrap();
        let bpm = BufferPool::new(disk, lru_k(10), 10);

        for i in 0..5u8 {
            let mut guard = bpm.new_page().await.unwrap();
            guard.data_mut()[0] = i;
            guard.data_mut()[1] = i.wrapping_mul(2);
        }

        bpm.flush_all().await.unwrap();
    }
    // Pool and disk dropped here, file closed.

    let disk = FileDisk::open(&path).await.unwrap();
    let bpm = BufferPool::new(disk, lru_k(10), 10);

    for i in 0..5u8 {
        let guard = bpm.fetch_page(PageId::new(i as u64)).await.unwrap();
        assert_eq!(guard.data()[0], i, "page {} byte 0 mismatch", i);
        assert_eq!(
            guard.data()[1],
            i.wrapping_mul(2),
            "page {} byte 1 mismatch",
            i
        );
    }
}

/// delete_page frees the frame and fails only while the page is pinned.
#[tokio::test]
async fn test_delete_page_lifecycle() {
    let bpm = BufferPool::new(MemoryDisk::new(), lru_k(4), 4);

    let guard = bpm.new_page().await.unwrap();
    let page_id = guard.page_id();

    assert!(!bpm.delete_page(page_id).await.unwrap());
    drop(guard);
    assert!(bpm.delete_page(page_id).await.unwrap());
    assert_eq!(bpm.page_count(), 0);

    // Deleting again is vacuous.
    assert!(bpm.delete_page(page_id).await.unwrap());
}

/// The pool is generic over the replacement policy.
struct FifoReplacer {
    queue: std::collections::VecDeque<FrameId>,
    evictable: std::collections::HashSet<FrameId>,
}

impl FifoReplacer {
    fn new() -> Self {
        Self {
            queue: std::collections::VecDeque::new(),
            evictable: std::collections::HashSet::new(),
        }
    }
}

impl Replacer for FifoReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        if !self.queue.contains(&frame_id) {
            self.queue.push_back(frame_id);
        }
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if !self.queue.contains(&frame_id) {
            return;
        }
        if evictable {
            self.evictable.insert(frame_id);
        } else {
            self.evictable.remove(&frame_id);
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        let pos = self.queue.iter().position(|f| self.evictable.contains(f))?;
        let frame_id = self.queue.remove(pos)?;
        self.evictable.remove(&frame_id);
        Some(frame_id)
    }

    fn remove(&mut self, frame_id: FrameId) {
        self.queue.retain(|&f| f != frame_id);
        self.evictable.remove(&frame_id);
    }

    fn size(&self) -> usize {
        self.evictable.len()
    }
}

/// Disk wrapper that fails writes while the flag is set.
struct FlakyDisk {
    inner: MemoryDisk,
    fail_writes: Arc<AtomicBool>,
}

impl DiskManager for FlakyDisk {
    async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), DiskError> {
        self.inner.read_page(page_id, buf).await
    }

    async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), DiskError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DiskError::Io(std::io::Error::other("injected write failure")));
        }
        self.inner.write_page(page_id, buf).await
    }

    async fn allocate_page(&self) -> Result<PageId, DiskError> {
        self.inner.allocate_page().await
    }

    async fn deallocate_page(&self, page_id: PageId) -> Result<(), DiskError> {
        self.inner.deallocate_page(page_id).await
    }

    async fn page_count(&self) -> u64 {
        self.inner.page_count().await
    }

    async fn sync_all(&self) -> Result<(), DiskError> {
        self.inner.sync_all().await
    }
}

/// A failed eviction write-back must not lose data or masquerade as the
/// caller's own disk error.
#[tokio::test]
async fn test_eviction_writeback_failure_is_recoverable() {
    let fail_writes = Arc::new(AtomicBool::new(false));
    let disk = FlakyDisk {
        inner: MemoryDisk::new(),
        fail_writes: Arc::clone(&fail_writes),
    };
    let bpm = BufferPool::new(disk, lru_k(2), 2);

    // Fill the pool with two dirty pages.
    let p0 = {
        let mut guard = bpm.new_page().await.unwrap();
        guard.data_mut()[0] = 100;
        guard.page_id()
    };
    let p1 = {
        let mut guard = bpm.new_page().await.unwrap();
        guard.data_mut()[0] = 101;
        guard.page_id()
    };

    fail_writes.store(true, Ordering::SeqCst);

    // Every eviction candidate needs a write-back and every write fails:
    // the caller sees a dedicated write-back error.
    let result = bpm.new_page().await;
    assert!(matches!(
        result,
        Err(BufferPoolError::WritebackFailed { .. })
    ));

    // Both pages stay resident and dirty; nothing was silently dropped.
    assert_eq!(bpm.page_count(), 2);
    assert_eq!(bpm.is_dirty(p0), Some(true));
    assert_eq!(bpm.is_dirty(p1), Some(true));

    // Once the disk recovers, eviction proceeds and the data survives.
    fail_writes.store(false, Ordering::SeqCst);
    drop(bpm.new_page().await.unwrap());

    let guard = bpm.fetch_page(p0).await.unwrap();
    assert_eq!(guard.data()[0], 100);
    drop(guard);
    let guard = bpm.fetch_page(p1).await.unwrap();
    assert_eq!(guard.data()[0], 101);
}

#[tokio::test]
async fn test_custom_replacer() {
    let bpm = BufferPool::new(MemoryDisk::new(), FifoReplacer::new(), 3);

    let mut page_ids = Vec::new();
    for i in 0..3u8 {
        let mut guard = bpm.new_page().await.unwrap();
        guard.data_mut()[0] = i;
        page_ids.push(guard.page_id());
    }

    // A fourth page evicts page 0 (FIFO order).
    {
        let mut guard = bpm.new_page().await.unwrap();
        guard.data_mut()[0] = 3;
    }

    // Page 0 was evicted but its data was written back.
    let guard = bpm.fetch_page(page_ids[0]).await.unwrap();
    assert_eq!(guard.data()[0], 0);
}
