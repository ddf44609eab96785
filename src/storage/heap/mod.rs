mod table_heap;

pub use table_heap::{TableHeap, TableHeapError, TableHeapResult, TableIterator};
