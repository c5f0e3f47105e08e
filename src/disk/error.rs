//! Disk layer errors.

use thiserror::Error;

use crate::page::PageId;

/// Errors surfaced by disk manager implementations.
#[derive(Debug, Error)]
pub enum DiskError {
    /// The page has not been allocated, or has been deallocated.
    #[error("page not found: {0:?}")]
    PageNotFound(PageId),

    /// A read or write buffer was not exactly `PAGE_SIZE` bytes.
    #[error("invalid buffer size: expected {expected}, got {actual}")]
    InvalidBufferSize {
        /// Expected buffer size (`PAGE_SIZE`).
        expected: usize,
        /// Actual buffer size provided.
        actual: usize,
    },

    /// I/O error from the underlying file system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend cannot allocate more pages.
    #[error("disk is full")]
    DiskFull,

    /// The backing file has an invalid format or size.
    #[error("data corruption: {0}")]
    Corrupted(String),
}
