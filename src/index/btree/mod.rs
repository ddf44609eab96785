pub mod error;
pub mod index;
pub mod iterator;
pub mod node;
pub mod serialization;

mod deletion;

pub use error::{BTreeError, BTreeResult};
pub use index::BTreeIndex;
pub use iterator::BTreeIterator;
