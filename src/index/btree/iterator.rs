use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::{BTreeError, BTreeResult};
use crate::index::btree::index::BTreeIndex;
use crate::index::btree::node::{BTreeNode, LeafNode};
use crate::index::btree::serialization::deserialize_node;
use crate::storage::buffer::BufferPoolManager;

/// Forward scan over the leaf chain, yielding `(key, rid)` in key order.
///
/// The iterator works on decoded snapshots of each leaf: a leaf is pinned
/// only while it is being decoded, and the chain pointer carries the scan
/// to the next leaf.
pub struct BTreeIterator<K> {
    buffer_pool: Arc<BufferPoolManager>,
    leaf: Option<LeafNode<K>>,
    index: usize,
}

impl<K> BTreeIterator<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(
        buffer_pool: Arc<BufferPoolManager>,
        leaf: Option<LeafNode<K>>,
        index: usize,
    ) -> Self {
        Self {
            buffer_pool,
            leaf,
            index,
        }
    }

    fn load_leaf(&self, page_id: PageId) -> BTreeResult<LeafNode<K>> {
        let guard = self.buffer_pool.fetch_page_guarded(page_id)?;
        let page = guard.read();
        match deserialize_node::<K>(&page)? {
            BTreeNode::Leaf(leaf) => Ok(leaf),
            BTreeNode::Internal(_) => Err(BTreeError::InvalidNode(page_id)),
        }
    }
}

impl<K> Iterator for BTreeIterator<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Item = BTreeResult<(K, Rid)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf = self.leaf.as_ref()?;

            if self.index < leaf.keys.len() {
                let item = (leaf.keys[self.index].clone(), leaf.values[self.index]);
                self.index += 1;
                return Some(Ok(item));
            }

            let next = leaf.next_leaf;
            if next == INVALID_PAGE_ID {
                self.leaf = None;
                return None;
            }

            match self.load_leaf(next) {
                Ok(next_leaf) => {
                    self.leaf = Some(next_leaf);
                    self.index = 0;
                }
                Err(e) => {
                    self.leaf = None;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<K> BTreeIndex<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Iterator positioned at the smallest key
    pub fn begin(&self) -> BTreeResult<BTreeIterator<K>> {
        let root = self.root.lock();
        if *root == INVALID_PAGE_ID {
            return Ok(BTreeIterator::new(self.buffer_pool().clone(), None, 0));
        }

        let mut page_id = *root;
        loop {
            match self.load_node(page_id)? {
                BTreeNode::Leaf(leaf) => {
                    return Ok(BTreeIterator::new(
                        self.buffer_pool().clone(),
                        Some(leaf),
                        0,
                    ));
                }
                BTreeNode::Internal(internal) => {
                    page_id = internal.children[0];
                }
            }
        }
    }

    /// Iterator positioned at the first key `>= key`
    pub fn begin_at(&self, key: &K) -> BTreeResult<BTreeIterator<K>> {
        let root = self.root.lock();
        if *root == INVALID_PAGE_ID {
            return Ok(BTreeIterator::new(self.buffer_pool().clone(), None, 0));
        }

        let leaf = self.find_leaf(*root, key)?;
        let index = match leaf.keys.binary_search(key) {
            Ok(i) => i,
            Err(i) => i,
        };
        Ok(BTreeIterator::new(
            self.buffer_pool().clone(),
            Some(leaf),
            index,
        ))
    }
}
