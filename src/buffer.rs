//! Buffer pool for page caching.
//!
//! The buffer pool holds a bounded number of fixed-size pages in memory,
//! mediates all reads and writes between callers and the disk manager, and
//! evicts pages with an LRU-K replacement policy. Access is through
//! RAII guards that pin a page for as long as they live.
//!
//! # Example
//!
//! ```no_run
//! use pagepool::buffer::{BufferPool, LruKReplacer};
//! use pagepool::disk::MemoryDisk;
//!
//! # async fn example() {
//! let disk = MemoryDisk::new();
//! let pool = BufferPool::new(disk, LruKReplacer::new(64, 2), 64);
//!
//! // Allocate and write a new page
//! let mut guard = pool.new_page().await.unwrap();
//! let page_id = guard.page_id();
//! guard[0..5].copy_from_slice(b"hello");
//! drop(guard); // Unpins and marks dirty
//!
//! // Read the page back
//! let guard = pool.fetch_page(page_id).await.unwrap();
//! assert_eq!(&guard[0..5], b"hello");
//! # }
//! ```

mod error;
mod frame;
mod guard;
mod pool;
mod replacer;

pub use error::BufferPoolError;
pub use frame::FrameId;
pub use guard::{PageReadGuard, PageWriteGuard};
pub use pool::BufferPool;
pub use replacer::{LruKReplacer, Replacer};
