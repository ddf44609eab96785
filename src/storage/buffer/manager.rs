use std::cell::Cell;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::types::{
    Frame, FrameId, FramePtr, Page, PageId, PagePtr, INVALID_PAGE_ID,
};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::page_table::ExtendibleHashTable;
use crate::storage::buffer::replacer::LruKReplacer;
use crate::storage::disk::DiskManager;

/// Bucket capacity of the page-table directory
const PAGE_TABLE_BUCKET_SIZE: usize = 8;

/// Structural state guarded by the pool latch
struct PoolMeta {
    free_list: VecDeque<FrameId>,
    next_page_id: PageId,
}

/// Fixed-frame page cache over the disk manager.
///
/// Owns the frame array, the free list, the extendible-hash page table and
/// the LRU-K replacer. One latch serializes all structural operations; page
/// contents are protected by the per-page RwLock.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<FramePtr>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: LruKReplacer,
    latch: Mutex<PoolMeta>,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    pub fn new(
        pool_size: usize,
        replacer_k: usize,
        db_path: impl AsRef<Path>,
    ) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::with_disk_manager(pool_size, replacer_k, disk_manager))
    }

    pub fn with_disk_manager(
        pool_size: usize,
        replacer_k: usize,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let page = Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID)));
            frames.push(Arc::new(RwLock::new(Frame::new(i, page))));
            free_list.push_back(i);
        }

        Self {
            pool_size,
            frames,
            page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
            replacer: LruKReplacer::new(pool_size, replacer_k),
            latch: Mutex::new(PoolMeta {
                free_list,
                next_page_id: 0,
            }),
            disk_manager,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn disk_manager(&self) -> Arc<DiskManager> {
        self.disk_manager.clone()
    }

    /// Allocate a fresh page id, materialize it in a frame and pin it
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut meta = self.latch.lock();

        let frame_id = self.allocate_frame(&mut *meta)?;
        let page_id = meta.next_page_id;
        meta.next_page_id += 1;

        let frame = &self.frames[frame_id];
        {
            let mut frame_guard = frame.write();
            frame_guard.page.write().reset(page_id);
            frame_guard.pin_count = 1;
            // Dirty from birth so the allocation survives eviction
            frame_guard.is_dirty = true;
        }

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok((frame.read().page.clone(), page_id))
    }

    /// Fetch a page, reading it from disk when not resident
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidOperation(format!(
                "cannot fetch page {}",
                page_id
            )));
        }

        let mut meta = self.latch.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id];
            frame.write().pin_count += 1;
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            return Ok(frame.read().page.clone());
        }

        let frame_id = self.allocate_frame(&mut *meta)?;
        let frame = &self.frames[frame_id];
        {
            let mut frame_guard = frame.write();
            {
                let mut page_guard = frame_guard.page.write();
                self.disk_manager.read_page(page_id, &mut page_guard)?;
            }
            frame_guard.pin_count = 1;
            frame_guard.is_dirty = false;
        }

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(frame.read().page.clone())
    }

    /// Drop one pin on a page, merging the caller's dirty flag.
    /// The frame becomes evictable when the pin count reaches zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let _meta = self.latch.lock();

        let frame_id = self
            .page_table
            .find(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        let frame = &self.frames[frame_id];
        let mut frame_guard = frame.write();
        if frame_guard.pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }
        frame_guard.pin_count -= 1;
        frame_guard.is_dirty |= is_dirty;
        if frame_guard.pin_count == 0 {
            self.replacer.set_evictable(frame_id, true);
        }

        Ok(())
    }

    /// Write a page through to disk regardless of its dirty bit, then clear it
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let _meta = self.latch.lock();

        let frame_id = self
            .page_table
            .find(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        let frame = &self.frames[frame_id];
        {
            let frame_guard = frame.read();
            let page_guard = frame_guard.page.read();
            self.disk_manager.write_page(&page_guard)?;
        }
        frame.write().is_dirty = false;

        Ok(())
    }

    /// Flush every resident page
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let _meta = self.latch.lock();

        for frame in &self.frames {
            let frame_guard = frame.read();
            let page_guard = frame_guard.page.read();
            if page_guard.page_id != INVALID_PAGE_ID {
                self.disk_manager.write_page(&page_guard)?;
                drop(page_guard);
                drop(frame_guard);
                frame.write().is_dirty = false;
            }
        }

        Ok(())
    }

    /// Evict an unpinned page from the pool and return its frame to the
    /// free list. Deleting a non-resident page succeeds trivially.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut meta = self.latch.lock();

        let frame_id = match self.page_table.find(&page_id) {
            Some(id) => id,
            None => return Ok(()),
        };

        let frame = &self.frames[frame_id];
        {
            let mut frame_guard = frame.write();
            if frame_guard.pin_count > 0 {
                return Err(BufferPoolError::PagePinned(page_id));
            }
            frame_guard.page.write().reset(INVALID_PAGE_ID);
            frame_guard.is_dirty = false;
        }

        self.page_table.remove(&page_id);
        self.replacer.remove(frame_id);
        meta.free_list.push_back(frame_id);

        Ok(())
    }

    /// Current pin count of a resident page. Diagnostic helper for tests.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let _meta = self.latch.lock();
        let frame_id = self.page_table.find(&page_id)?;
        Some(self.frames[frame_id].read().pin_count)
    }

    /// Fetch a page behind a scoped guard that unpins on drop
    pub fn fetch_page_guarded(
        self: &Arc<Self>,
        page_id: PageId,
    ) -> Result<PageGuard, BufferPoolError> {
        let page = self.fetch_page(page_id)?;
        Ok(PageGuard::new(Arc::clone(self), page_id, page))
    }

    /// Allocate a page behind a scoped guard; the guard starts dirty
    pub fn new_page_guarded(self: &Arc<Self>) -> Result<PageGuard, BufferPoolError> {
        let (page, page_id) = self.new_page()?;
        let guard = PageGuard::new(Arc::clone(self), page_id, page);
        guard.dirty.set(true);
        Ok(guard)
    }

    /// Take a frame from the free list, or evict a victim chosen by the
    /// replacer (writing it back first when dirty). Requires the pool latch.
    fn allocate_frame(&self, meta: &mut PoolMeta) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = meta.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.evict().ok_or(BufferPoolError::NoFreeFrames)?;

        let frame = &self.frames[frame_id];
        let (old_page_id, dirty) = {
            let frame_guard = frame.read();
            let result = (frame_guard.page.read().page_id, frame_guard.is_dirty);
            result
        };

        if old_page_id != INVALID_PAGE_ID {
            if dirty {
                debug!("evicting dirty page {} from frame {}", old_page_id, frame_id);
                let frame_guard = frame.read();
                let page_guard = frame_guard.page.read();
                self.disk_manager.write_page(&page_guard)?;
            }
            self.page_table.remove(&old_page_id);
        }

        Ok(frame_id)
    }
}

/// Scoped handle over a pinned page.
///
/// Guarantees exactly one unpin on every exit path; borrowing the page for
/// writing marks the guard dirty, and the flag is handed to `unpin_page`
/// when the guard drops.
pub struct PageGuard {
    bpm: Arc<BufferPoolManager>,
    page_id: PageId,
    page: PagePtr,
    dirty: Cell<bool>,
}

impl PageGuard {
    fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, page: PagePtr) -> Self {
        Self {
            bpm,
            page_id,
            page,
            dirty: Cell::new(false),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Page> {
        self.dirty.set(true);
        self.page.write()
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Err(e) = self.bpm.unpin_page(self.page_id, self.dirty.get()) {
            debug!("unpin of page {} failed: {}", self.page_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_pool(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let bpm = Arc::new(BufferPoolManager::new(pool_size, 2, file.path()).unwrap());
        (bpm, file)
    }

    #[test]
    fn test_page_ids_are_monotonic_from_zero() {
        let (bpm, _file) = test_pool(4);
        for expect in 0..4 {
            let (_, page_id) = bpm.new_page().unwrap();
            assert_eq!(page_id, expect);
        }
    }

    #[test]
    fn test_guard_unpins_on_drop() {
        let (bpm, _file) = test_pool(4);
        let page_id = {
            let guard = bpm.new_page_guarded().unwrap();
            assert_eq!(bpm.pin_count(guard.page_id()), Some(1));
            guard.page_id()
        };
        assert_eq!(bpm.pin_count(page_id), Some(0));
    }

    #[test]
    fn test_guard_write_marks_dirty() {
        let (bpm, _file) = test_pool(2);
        let page_id = {
            let guard = bpm.new_page_guarded().unwrap();
            guard.write().data[0] = 7;
            guard.page_id()
        };
        // Force the page out and back in
        let (_, other) = bpm.new_page().unwrap();
        bpm.unpin_page(other, false).unwrap();
        let _spill = bpm.new_page().unwrap();

        let guard = bpm.fetch_page_guarded(page_id).unwrap();
        assert_eq!(guard.read().data[0], 7);
    }

    #[test]
    fn test_nested_pins_counted() {
        let (bpm, _file) = test_pool(4);
        let (_, page_id) = bpm.new_page().unwrap();
        let _again = bpm.fetch_page(page_id).unwrap();
        assert_eq!(bpm.pin_count(page_id), Some(2));
        bpm.unpin_page(page_id, false).unwrap();
        assert_eq!(bpm.pin_count(page_id), Some(1));
        bpm.unpin_page(page_id, false).unwrap();
        assert_eq!(bpm.pin_count(page_id), Some(0));
        assert!(matches!(
            bpm.unpin_page(page_id, false),
            Err(BufferPoolError::PageNotPinned(_))
        ));
    }

    #[test]
    fn test_no_frame_reclaimable() {
        let (bpm, _file) = test_pool(2);
        let (_, a) = bpm.new_page().unwrap();
        let (_, b) = bpm.new_page().unwrap();
        assert!(matches!(bpm.new_page(), Err(BufferPoolError::NoFreeFrames)));

        bpm.unpin_page(a, false).unwrap();
        assert!(bpm.new_page().is_ok());
        bpm.unpin_page(b, false).unwrap();
    }

    #[test]
    fn test_delete_page_recycles_frame() {
        let (bpm, _file) = test_pool(1);
        let (_, page_id) = bpm.new_page().unwrap();
        assert!(matches!(
            bpm.delete_page(page_id),
            Err(BufferPoolError::PagePinned(_))
        ));
        bpm.unpin_page(page_id, false).unwrap();
        bpm.delete_page(page_id).unwrap();
        // Deleting again is a no-op; the frame is free for reuse
        bpm.delete_page(page_id).unwrap();
        assert!(bpm.new_page().is_ok());
    }
}
