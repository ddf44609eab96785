use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type; valid ids are non-negative
pub type PageId = i32;

/// Sentinel for "no page"
pub const INVALID_PAGE_ID: PageId = -1;

/// Buffer pool frame slot type
pub type FrameId = usize;

/// Transaction ID type
pub type TxnId = u32;

/// Table OID type
pub type TableOid = u32;

/// Index OID type
pub type IndexOid = u32;

/// Record identifier: the (page, slot) address of a tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    pub const INVALID: Rid = Rid {
        page_id: INVALID_PAGE_ID,
        slot: 0,
    };

    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    pub fn is_valid(&self) -> bool {
        self.page_id != INVALID_PAGE_ID
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

/// Page structure: a fixed-size byte buffer plus its identity
#[derive(Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
        }
    }

    /// Zero the payload and rebind the buffer to a new page id
    pub fn reset(&mut self, page_id: PageId) {
        self.data.fill(0);
        self.page_id = page_id;
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page").field("page_id", &self.page_id).finish()
    }
}

/// Smart pointer to a page; the RwLock is the per-page latch
pub type PagePtr = Arc<RwLock<Page>>;

/// Buffer pool frame structure
#[derive(Debug)]
pub struct Frame {
    pub frame_id: FrameId,
    pub page: PagePtr,
    pub pin_count: u32,
    pub is_dirty: bool,
}

impl Frame {
    pub fn new(frame_id: FrameId, page: PagePtr) -> Self {
        Self {
            frame_id,
            page,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

/// Smart pointer to a frame
pub type FramePtr = Arc<RwLock<Frame>>;
