use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::page::{PageError, PageManager};

#[derive(Error, Debug)]
pub enum TableHeapError {
    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Tuple larger than a page: {0} bytes")]
    TupleTooLarge(usize),
}

pub type TableHeapResult<T> = Result<T, TableHeapError>;

/// Heap of tuples stored on a chain of slotted pages.
///
/// All page access goes through the buffer pool. Deletion is two-phase:
/// `mark_delete` tombstones a tuple, `rollback_delete` reverts it and
/// `apply_delete` removes it for good; these are the compensation hooks
/// the transactional operators rely on.
pub struct TableHeap {
    buffer_pool: Arc<BufferPoolManager>,
    page_manager: PageManager,
    first_page_id: PageId,
    /// Serializes inserts so page-chain growth is race-free
    insert_latch: Mutex<()>,
}

impl TableHeap {
    /// Create a heap with a fresh first page
    pub fn create(buffer_pool: Arc<BufferPoolManager>) -> TableHeapResult<Self> {
        let page_manager = PageManager::new();
        let guard = buffer_pool.new_page_guarded()?;
        let first_page_id = guard.page_id();
        page_manager.init_page(&mut guard.write());
        drop(guard);

        Ok(Self {
            buffer_pool,
            page_manager,
            first_page_id,
            insert_latch: Mutex::new(()),
        })
    }

    /// Open a heap whose first page already exists
    pub fn open(buffer_pool: Arc<BufferPoolManager>, first_page_id: PageId) -> Self {
        Self {
            buffer_pool,
            page_manager: PageManager::new(),
            first_page_id,
            insert_latch: Mutex::new(()),
        }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Append a tuple, walking the page chain for space and growing it at
    /// the tail when every page is full
    pub fn insert_tuple(&self, data: &[u8]) -> TableHeapResult<Rid> {
        let _latch = self.insert_latch.lock();

        let mut page_id = self.first_page_id;
        loop {
            let guard = self.buffer_pool.fetch_page_guarded(page_id)?;

            let insert_result = {
                let mut page = guard.write();
                self.page_manager.insert_record(&mut page, data)
            };
            match insert_result {
                Ok(slot) => return Ok(Rid::new(page_id, slot)),
                Err(PageError::InsufficientSpace) => {}
                Err(e) => return Err(e.into()),
            }

            let next = {
                let page = guard.read();
                self.page_manager.get_header(&page).next_page_id
            };
            if next != INVALID_PAGE_ID {
                drop(guard);
                page_id = next;
                continue;
            }

            // Tail reached: link a fresh page and insert there
            let new_guard = self.buffer_pool.new_page_guarded()?;
            let new_page_id = new_guard.page_id();
            {
                let mut new_page = new_guard.write();
                self.page_manager.init_page(&mut new_page);
                let mut header = self.page_manager.get_header(&new_page);
                header.prev_page_id = page_id;
                self.page_manager.set_header(&mut new_page, &header);
            }
            {
                let mut page = guard.write();
                let mut header = self.page_manager.get_header(&page);
                header.next_page_id = new_page_id;
                self.page_manager.set_header(&mut page, &header);
            }
            drop(guard);

            let slot = {
                let mut new_page = new_guard.write();
                match self.page_manager.insert_record(&mut new_page, data) {
                    Ok(slot) => slot,
                    Err(PageError::InsufficientSpace) => {
                        return Err(TableHeapError::TupleTooLarge(data.len()))
                    }
                    Err(e) => return Err(e.into()),
                }
            };
            return Ok(Rid::new(new_page_id, slot));
        }
    }

    /// Read a live tuple's bytes
    pub fn get_tuple(&self, rid: Rid) -> TableHeapResult<Vec<u8>> {
        let guard = self.buffer_pool.fetch_page_guarded(rid.page_id)?;
        let page = guard.read();
        Ok(self.page_manager.get_record(&page, rid.slot)?)
    }

    /// Tombstone a tuple pending commit
    pub fn mark_delete(&self, rid: Rid) -> TableHeapResult<()> {
        let guard = self.buffer_pool.fetch_page_guarded(rid.page_id)?;
        let mut page = guard.write();
        Ok(self.page_manager.mark_delete(&mut page, rid.slot)?)
    }

    /// Undo a tombstone
    pub fn rollback_delete(&self, rid: Rid) -> TableHeapResult<()> {
        let guard = self.buffer_pool.fetch_page_guarded(rid.page_id)?;
        let mut page = guard.write();
        Ok(self.page_manager.rollback_delete(&mut page, rid.slot)?)
    }

    /// Physically remove a tuple (tombstoned or not)
    pub fn apply_delete(&self, rid: Rid) -> TableHeapResult<()> {
        let guard = self.buffer_pool.fetch_page_guarded(rid.page_id)?;
        let mut page = guard.write();
        Ok(self.page_manager.apply_delete(&mut page, rid.slot)?)
    }

    /// Iterate live tuples in (page, slot) order
    pub fn iter(self: &Arc<Self>) -> TableIterator {
        TableIterator {
            heap: Arc::clone(self),
            page_id: self.first_page_id,
            slot: 0,
        }
    }
}

/// Forward scan over the heap's live tuples
pub struct TableIterator {
    heap: Arc<TableHeap>,
    page_id: PageId,
    slot: u32,
}

impl TableIterator {
    fn next_inner(&mut self) -> TableHeapResult<Option<(Rid, Vec<u8>)>> {
        loop {
            if self.page_id == INVALID_PAGE_ID {
                return Ok(None);
            }

            let guard = self.heap.buffer_pool.fetch_page_guarded(self.page_id)?;
            let page = guard.read();
            let count = self.heap.page_manager.record_count(&page);

            while self.slot < count {
                let slot = self.slot;
                self.slot += 1;
                if let Some((bytes, tombstoned)) =
                    self.heap.page_manager.record_state(&page, slot)?
                {
                    if !tombstoned {
                        return Ok(Some((Rid::new(self.page_id, slot), bytes)));
                    }
                }
            }

            self.page_id = self.heap.page_manager.get_header(&page).next_page_id;
            self.slot = 0;
        }
    }
}

impl Iterator for TableIterator {
    type Item = TableHeapResult<(Rid, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_inner().transpose()
    }
}
