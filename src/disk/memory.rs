//! In-memory disk manager for testing.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::disk::{DiskError, DiskManager};
use crate::page::{PAGE_SIZE, PageId};

/// In-memory disk manager.
///
/// Pages live in a `HashMap<PageId, Box<[u8; PAGE_SIZE]>>` behind a mutex.
/// Nothing is persistent; all data is lost on drop. Operations are plain
/// memory copies, so holding the mutex across them is fine.
pub struct MemoryDisk {
    /// Raw page data. Deallocated pages are removed from the map while
    /// `next_page_id` keeps counting, which is what burns their ids.
    pages: Mutex<HashMap<PageId, Box<[u8; PAGE_SIZE]>>>,
    /// Next page id to allocate.
    next_page_id: Mutex<u64>,
    /// Optional allocation cap, for exercising `DiskFull` in tests.
    max_pages: Option<u64>,
}

impl MemoryDisk {
    /// Creates a new empty in-memory disk.
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            next_page_id: Mutex::new(0),
            max_pages: None,
        }
    }

    /// Creates an in-memory disk that refuses to allocate more than
    /// `max_pages` page ids.
    pub fn with_max_pages(max_pages: u64) -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            next_page_id: Mutex::new(0),
            max_pages: Some(max_pages),
        }
    }
}

impl Default for MemoryDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskManager for MemoryDisk {
    async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), DiskError> {
        if buf.len() != PAGE_SIZE {
            return Err(DiskError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let pages = self.pages.lock();
        let page = pages
            .get(&page_id)
            .ok_or(DiskError::PageNotFound(page_id))?;

        buf.copy_from_slice(&**page);
        Ok(())
    }

    async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), DiskError> {
        if buf.len() != PAGE_SIZE {
            return Err(DiskError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut pages = self.pages.lock();
        let page = pages
            .get_mut(&page_id)
            .ok_or(DiskError::PageNotFound(page_id))?;

        page.copy_from_slice(buf);
        Ok(())
    }

    async fn allocate_page(&self) -> Result<PageId, DiskError> {
        let mut next_id = self.next_page_id.lock();

        if let Some(max) = self.max_pages
            && *next_id >= max
        {
            return Err(DiskError::DiskFull);
        }

        let page_id = PageId::new(*next_id);
        *next_id += 1;

        self.pages.lock().insert(page_id, Box::new([0u8; PAGE_SIZE]));

        Ok(page_id)
    }

    async fn deallocate_page(&self, page_id: PageId) -> Result<(), DiskError> {
        // Drops the backing memory; the id stays burned because
        // next_page_id never goes backwards.
        self.pages.lock().remove(&page_id);
        Ok(())
    }

    async fn page_count(&self) -> u64 {
        *self.next_page_id.lock()
    }

    async fn sync_all(&self) -> Result<(), DiskError> {
        Ok(())
    }
}
