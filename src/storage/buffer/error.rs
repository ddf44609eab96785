use thiserror::Error;

use crate::common::types::PageId;
use crate::storage::disk::DiskManagerError;

#[derive(Error, Debug)]
pub enum BufferPoolError {
    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Page {0} is pinned")]
    PagePinned(PageId),

    #[error("Page {0} is not pinned")]
    PageNotPinned(PageId),

    #[error("No free frames available")]
    NoFreeFrames,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Disk manager error: {0}")]
    DiskManagerError(#[from] DiskManagerError),
}
