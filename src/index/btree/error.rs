use thiserror::Error;

use crate::common::types::PageId;
use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum BTreeError {
    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Failed to encode node: {0}")]
    Serialization(String),

    #[error("Failed to decode node: {0}")]
    Deserialization(String),

    #[error("Node does not fit in a page")]
    NodeTooLarge,

    #[error("Page {0} does not hold the expected node kind")]
    InvalidNode(PageId),

    #[error("Index directory page is full")]
    DirectoryFull,

    #[error("Index {0} is not registered in the directory")]
    UnknownIndex(String),
}

pub type BTreeResult<T> = Result<T, BTreeError>;
