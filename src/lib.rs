pub mod buffer;
pub mod container;
pub mod disk;
pub mod page;

pub use buffer::{
    BufferPool, BufferPoolError, FrameId, LruKReplacer, PageReadGuard, PageWriteGuard, Replacer,
};
pub use container::ExtendibleHashTable;
pub use disk::{DiskError, DiskManager, FileDisk, MemoryDisk};
pub use page::{PAGE_SIZE, PageData, PageId};
