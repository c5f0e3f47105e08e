//! File-backed disk manager.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::disk::{DiskError, DiskManager};
use crate::page::{PAGE_SIZE, PageId};

/// File-backed disk manager.
///
/// Stores pages as contiguous `PAGE_SIZE` blocks in a single file, using
/// `tokio::fs` for async I/O.
///
/// # File Layout
///
/// ```text
/// +------------------+------------------+------------------+
/// | Page 0 (4KB)     | Page 1 (4KB)     | Page 2 (4KB)     | ...
/// +------------------+------------------+------------------+
/// ^ offset 0         ^ offset 4096      ^ offset 8192
/// ```
///
/// # Concurrency
///
/// A `tokio::sync::Mutex` around the file handle serializes all I/O.
///
/// # Durability
///
/// `sync_all` calls `File::sync_all` to push data to physical disk. Without
/// it, writes may be lost on crash.
pub struct FileDisk {
    /// Path to the backing file.
    path: PathBuf,
    /// File handle wrapped in an async mutex for serialized access.
    file: Mutex<File>,
    /// Number of page ids allocated so far.
    page_count: AtomicU64,
    /// Ids that were deallocated. The file keeps the hole; the set makes
    /// reads of those pages fail.
    deallocated: parking_lot::Mutex<HashSet<PageId>>,
}

impl FileDisk {
    /// Opens or creates a backing file at the given path.
    ///
    /// An existing file's page count is derived from its size; a missing
    /// file is created empty.
    ///
    /// # Errors
    ///
    /// Returns `DiskError::Corrupted` if the file size is not a multiple of
    /// `PAGE_SIZE`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, DiskError> {
        let path = path.into();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;

        let file_size = file.metadata().await?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(DiskError::Corrupted(format!(
                "file size {} is not a multiple of page size {}",
                file_size, PAGE_SIZE
            )));
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
            page_count: AtomicU64::new(file_size / PAGE_SIZE as u64),
            deallocated: parking_lot::Mutex::new(HashSet::new()),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_resident(&self, page_id: PageId) -> Result<(), DiskError> {
        if page_id.page_num() >= self.page_count.load(Ordering::Acquire)
            || self.deallocated.lock().contains(&page_id)
        {
            return Err(DiskError::PageNotFound(page_id));
        }
        Ok(())
    }
}

impl DiskManager for FileDisk {
    async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), DiskError> {
        if buf.len() != PAGE_SIZE {
            return Err(DiskError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        self.check_resident(page_id)?;

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        file.read_exact(buf).await?;

        Ok(())
    }

    async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), DiskError> {
        if buf.len() != PAGE_SIZE {
            return Err(DiskError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        self.check_resident(page_id)?;

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        file.write_all(buf).await?;

        Ok(())
    }

    async fn allocate_page(&self) -> Result<PageId, DiskError> {
        let mut file = self.file.lock().await;

        // The file lock also serializes allocation, so load/store is safe.
        let page_num = self.page_count.load(Ordering::Acquire);
        let page_id = PageId::new(page_num);

        // Extend the file with a zeroed page.
        file.seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        file.write_all(&[0u8; PAGE_SIZE]).await?;

        self.page_count.store(page_num + 1, Ordering::Release);

        Ok(page_id)
    }

    async fn deallocate_page(&self, page_id: PageId) -> Result<(), DiskError> {
        // The block stays in the file; no compaction.
        self.deallocated.lock().insert(page_id);
        Ok(())
    }

    async fn page_count(&self) -> u64 {
        self.page_count.load(Ordering::Acquire)
    }

    async fn sync_all(&self) -> Result<(), DiskError> {
        let file = self.file.lock().await;
        file.sync_all().await?;
        Ok(())
    }
}
