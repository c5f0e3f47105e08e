//! Disk manager: block I/O backends for page-sized reads and writes.
//!
//! This module provides the [`DiskManager`] trait along with the
//! `MemoryDisk` and `FileDisk` implementations. The buffer pool sits on top
//! of this layer and is the only intended caller.

mod error;
mod file;
mod memory;

pub use error::DiskError;
pub use file::FileDisk;
pub use memory::MemoryDisk;

use crate::page::PageId;

/// Block I/O backend trait for page-based storage.
///
/// The disk manager reads and writes `PAGE_SIZE` blocks using caller-owned
/// buffers and tracks page allocation with a monotonic counter.
///
/// # Design Decisions
///
/// 1. **Async trait**: uses `async fn` in the trait for compatibility with
///    tokio. File I/O goes through `tokio::fs`.
///
/// 2. **Caller-owned buffers**: this layer moves raw bytes only. Buffer
///    memory belongs to the caller (the buffer pool's frames).
///
/// 3. **Page-level operations**: all I/O is page-sized, for alignment with
///    OS pages and efficient block transfers.
///
/// 4. **Explicit allocation**: `allocate_page` grows the id space;
///    `deallocate_page` punches a hole in it. Ids are never reused.
///
/// 5. **No caching**: caching is the buffer pool's job.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. The buffer pool serializes its
/// own metadata; this layer only has to keep individual operations atomic.
pub trait DiskManager: Send + Sync {
    /// Reads a page into a caller-provided buffer.
    ///
    /// # Errors
    ///
    /// Returns `DiskError::PageNotFound` if the page has not been allocated
    /// (or has been deallocated), `DiskError::InvalidBufferSize` if
    /// `buf.len() != PAGE_SIZE`.
    fn read_page(
        &self,
        page_id: PageId,
        buf: &mut [u8],
    ) -> impl std::future::Future<Output = Result<(), DiskError>> + Send;

    /// Writes a page from a caller-provided buffer.
    ///
    /// # Errors
    ///
    /// Returns `DiskError::PageNotFound` if the page has not been allocated,
    /// `DiskError::InvalidBufferSize` if `buf.len() != PAGE_SIZE`.
    fn write_page(
        &self,
        page_id: PageId,
        buf: &[u8],
    ) -> impl std::future::Future<Output = Result<(), DiskError>> + Send;

    /// Allocates a new page and returns its id.
    ///
    /// Ids come from a monotonic counter: the first allocation on an empty
    /// backend returns `PageId(0)`, and deallocated ids are never handed
    /// out again. The new page reads back as zeros.
    fn allocate_page(
        &self,
    ) -> impl std::future::Future<Output = Result<PageId, DiskError>> + Send;

    /// Declares that a page will not be read again.
    ///
    /// This is a hint: the backend may reclaim the space, but the id stays
    /// burned. Reading a deallocated page fails with `PageNotFound`.
    fn deallocate_page(
        &self,
        page_id: PageId,
    ) -> impl std::future::Future<Output = Result<(), DiskError>> + Send;

    /// Returns the total number of page ids allocated so far.
    fn page_count(&self) -> impl std::future::Future<Output = u64> + Send;

    /// Syncs all pending writes to physical disk (fsync).
    ///
    /// For `MemoryDisk` this is a no-op. For `FileDisk` it calls
    /// `File::sync_all` so the write/durability distinction is explicit:
    /// - memory -> OS buffer: `write_page`
    /// - OS buffer -> physical disk: `sync_all`
    fn sync_all(&self) -> impl std::future::Future<Output = Result<(), DiskError>> + Send;
}
