//! RAII guards for buffer pool page access.
//!
//! A guard pins its page for as long as it lives: dropping the guard
//! unpins, and for write guards also reports whether the page was dirtied.
//! The scoped lifetime makes pin underflow and use-after-unpin
//! unrepresentable.

use std::ops::{Deref, DerefMut};

use tokio::sync::{RwLockReadGuard, RwLockWriteGuard};

use super::frame::FrameId;
use super::pool::BufferPoolInner;
use super::replacer::Replacer;
use crate::disk::DiskManager;
use crate::page::{PageData, PageId};

/// RAII guard for read-only page access.
///
/// Holds a shared lock on the frame's bytes; any number of read guards may
/// coexist on the same page. Dropping the guard unpins the page.
pub struct PageReadGuard<'a, D: DiskManager, R: Replacer> {
    pub(super) pool: &'a BufferPoolInner<D, R>,
    pub(super) frame_id: FrameId,
    pub(super) page_id: PageId,
    pub(super) data: RwLockReadGuard<'a, PageData>,
}

impl<D: DiskManager, R: Replacer> PageReadGuard<'_, D, R> {
    /// Returns the id of the pinned page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }
}

impl<D: DiskManager, R: Replacer> Deref for PageReadGuard<'_, D, R> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data.as_slice()
    }
}

impl<D: DiskManager, R: Replacer> Drop for PageReadGuard<'_, D, R> {
    fn drop(&mut self) {
        self.pool.unpin(self.frame_id, false);
    }
}

/// RAII guard for mutable page access.
///
/// Holds an exclusive lock on the frame's bytes. The first mutable access
/// marks the page dirty; dropping the guard unpins and reports the dirty
/// state to the pool.
pub struct PageWriteGuard<'a, D: DiskManager, R: Replacer> {
    pub(super) pool: &'a BufferPoolInner<D, R>,
    pub(super) frame_id: FrameId,
    pub(super) page_id: PageId,
    pub(super) data: RwLockWriteGuard<'a, PageData>,
    pub(super) dirtied: bool,
}

impl<D: DiskManager, R: Replacer> PageWriteGuard<'_, D, R> {
    /// Returns the id of the pinned page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Returns the page bytes mutably and marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirtied = true;
        self.data.as_mut_slice()
    }

    /// Marks the page dirty without touching the bytes.
    pub fn mark_dirty(&mut self) {
        self.dirtied = true;
    }
}

impl<D: DiskManager, R: Replacer> Deref for PageWriteGuard<'_, D, R> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data.as_slice()
    }
}

impl<D: DiskManager, R: Replacer> DerefMut for PageWriteGuard<'_, D, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.dirtied = true;
        self.data.as_mut_slice()
    }
}

impl<D: DiskManager, R: Replacer> Drop for PageWriteGuard<'_, D, R> {
    fn drop(&mut self) {
        self.pool.unpin(self.frame_id, self.dirtied);
    }
}
