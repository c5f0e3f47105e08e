//! Buffer pool errors.

use thiserror::Error;

use crate::disk::DiskError;
use crate::page::PageId;

/// Errors that can occur during buffer pool operations.
#[derive(Debug, Error)]
pub enum BufferPoolError {
    /// The pool is full and every resident page is pinned.
    ///
    /// The caller decides whether to retry, back off, or surface this.
    #[error("no free frames available and all pages are pinned")]
    NoFreeFrames,

    /// The requested page does not exist on disk.
    #[error("page not found: {0:?}")]
    PageNotFound(PageId),

    /// A dirty eviction victim could not be written back.
    ///
    /// Returned when freeing a frame required writing back some victim
    /// page and every candidate failed. `page_id` names the first victim
    /// that failed, not the page the caller asked for. The victim keeps
    /// its bytes and its dirty flag and stays eligible for later flushes
    /// and evictions.
    #[error("write-back of evicted page {page_id:?} failed: {source}")]
    WritebackFailed {
        /// The victim page whose write-back failed.
        page_id: PageId,
        /// The disk error behind the failure.
        source: DiskError,
    },

    /// Underlying disk I/O error.
    #[error("disk error: {0}")]
    Disk(#[source] DiskError),
}

impl From<DiskError> for BufferPoolError {
    fn from(e: DiskError) -> Self {
        match e {
            DiskError::PageNotFound(id) => BufferPoolError::PageNotFound(id),
            other => BufferPoolError::Disk(other),
        }
    }
}
