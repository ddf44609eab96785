use std::marker::PhantomData;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::{BTreeError, BTreeResult};
use crate::index::btree::node::{BTreeNode, InternalNode, LeafNode};
use crate::index::btree::serialization::{deserialize_node, serialize_node};
use crate::index::directory::IndexDirectory;
use crate::storage::buffer::BufferPoolManager;

/// Outcome of a recursive insert below some node
pub(crate) enum InsertResult<K> {
    /// The key was already present; nothing changed
    Duplicate,
    /// Inserted without splitting this subtree's root
    Done,
    /// The child split; `separator` is the first key reachable through
    /// the new `right` page
    Split { separator: K, right: PageId },
}

/// On-disk B+Tree index with unique keys and `Rid` values.
///
/// Nodes live on buffer-pool pages and are decoded whole per visit. One
/// tree-wide mutex (guarding the root page id) serializes lookups, inserts,
/// removes and iterator construction.
pub struct BTreeIndex<K> {
    name: String,
    buffer_pool: Arc<BufferPoolManager>,
    directory: Arc<IndexDirectory>,
    pub(crate) root: Mutex<PageId>,
    leaf_max_size: usize,
    internal_max_size: usize,
    _phantom: PhantomData<K>,
}

impl<K> BTreeIndex<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create an empty index and register it in the directory
    pub fn create(
        directory: Arc<IndexDirectory>,
        buffer_pool: Arc<BufferPoolManager>,
        name: impl Into<String>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> BTreeResult<Self> {
        assert!(leaf_max_size >= 2, "leaf max size must be at least 2");
        assert!(internal_max_size >= 3, "internal max size must be at least 3");

        let name = name.into();
        directory.set_root(&name, INVALID_PAGE_ID)?;
        Ok(Self {
            name,
            buffer_pool,
            directory,
            root: Mutex::new(INVALID_PAGE_ID),
            leaf_max_size,
            internal_max_size,
            _phantom: PhantomData,
        })
    }

    /// Reattach to an index previously registered in the directory
    pub fn open(
        directory: Arc<IndexDirectory>,
        buffer_pool: Arc<BufferPoolManager>,
        name: impl Into<String>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> BTreeResult<Self> {
        let name = name.into();
        let root = directory
            .get_root(&name)?
            .ok_or_else(|| BTreeError::UnknownIndex(name.clone()))?;
        Ok(Self {
            name,
            buffer_pool,
            directory,
            root: Mutex::new(root),
            leaf_max_size,
            internal_max_size,
            _phantom: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root page id, `INVALID_PAGE_ID` when the tree is empty
    pub fn root_page_id(&self) -> PageId {
        *self.root.lock()
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id() == INVALID_PAGE_ID
    }

    /// Point lookup: every value stored under `key` (zero or one, since
    /// keys are unique)
    pub fn get(&self, key: &K) -> BTreeResult<Vec<Rid>> {
        let root = self.root.lock();
        if *root == INVALID_PAGE_ID {
            return Ok(Vec::new());
        }

        let leaf = self.find_leaf(*root, key)?;
        Ok(leaf.lookup(key).into_iter().collect())
    }

    /// Insert a key; false when it is already present
    pub fn insert(&self, key: K, rid: Rid) -> BTreeResult<bool> {
        let mut root = self.root.lock();

        if *root == INVALID_PAGE_ID {
            let guard = self.buffer_pool.new_page_guarded()?;
            let mut leaf = LeafNode::new();
            leaf.insert(key, rid);
            serialize_node(&BTreeNode::Leaf(leaf), &mut guard.write())?;
            let page_id = guard.page_id();
            drop(guard);
            self.update_root(&mut *root, page_id)?;
            return Ok(true);
        }

        match self.insert_entry(*root, key, rid)? {
            InsertResult::Duplicate => Ok(false),
            InsertResult::Done => Ok(true),
            InsertResult::Split { separator, right } => {
                let guard = self.buffer_pool.new_page_guarded()?;
                let new_root = InternalNode {
                    keys: vec![separator],
                    children: vec![*root, right],
                };
                serialize_node(&BTreeNode::Internal(new_root), &mut guard.write())?;
                let page_id = guard.page_id();
                drop(guard);
                debug!("btree {}: new root {}", self.name, page_id);
                self.update_root(&mut *root, page_id)?;
                Ok(true)
            }
        }
    }

    fn insert_entry(&self, page_id: PageId, key: K, rid: Rid) -> BTreeResult<InsertResult<K>> {
        let guard = self.buffer_pool.fetch_page_guarded(page_id)?;
        let node: BTreeNode<K> = deserialize_node(&guard.read())?;

        match node {
            BTreeNode::Leaf(mut leaf) => {
                if !leaf.insert(key, rid) {
                    return Ok(InsertResult::Duplicate);
                }

                if leaf.size() == self.leaf_max_size {
                    let (mut right, separator) = leaf.split();
                    let right_guard = self.buffer_pool.new_page_guarded()?;
                    right.next_leaf = leaf.next_leaf;
                    leaf.next_leaf = right_guard.page_id();

                    serialize_node(&BTreeNode::Leaf(right), &mut right_guard.write())?;
                    serialize_node(&BTreeNode::Leaf(leaf), &mut guard.write())?;
                    Ok(InsertResult::Split {
                        separator,
                        right: right_guard.page_id(),
                    })
                } else {
                    serialize_node(&BTreeNode::Leaf(leaf), &mut guard.write())?;
                    Ok(InsertResult::Done)
                }
            }
            BTreeNode::Internal(mut internal) => {
                let ci = internal.child_index(&key);
                let child = internal.children[ci];

                match self.insert_entry(child, key, rid)? {
                    InsertResult::Duplicate => Ok(InsertResult::Duplicate),
                    InsertResult::Done => Ok(InsertResult::Done),
                    InsertResult::Split { separator, right } => {
                        internal.insert_split(ci, separator, right);

                        if internal.size() == self.internal_max_size {
                            let (right_node, separator) = internal.split();
                            let right_guard = self.buffer_pool.new_page_guarded()?;
                            serialize_node(
                                &BTreeNode::Internal(right_node),
                                &mut right_guard.write(),
                            )?;
                            serialize_node(&BTreeNode::Internal(internal), &mut guard.write())?;
                            Ok(InsertResult::Split {
                                separator,
                                right: right_guard.page_id(),
                            })
                        } else {
                            serialize_node(&BTreeNode::Internal(internal), &mut guard.write())?;
                            Ok(InsertResult::Done)
                        }
                    }
                }
            }
        }
    }

    /// Descend to the leaf whose range covers `key`
    pub(crate) fn find_leaf(&self, root: PageId, key: &K) -> BTreeResult<LeafNode<K>> {
        let mut page_id = root;
        loop {
            match self.load_node(page_id)? {
                BTreeNode::Leaf(leaf) => return Ok(leaf),
                BTreeNode::Internal(internal) => {
                    page_id = internal.children[internal.child_index(key)];
                }
            }
        }
    }

    /// Decode the node on `page_id`, pinning the page only while decoding
    pub(crate) fn load_node(&self, page_id: PageId) -> BTreeResult<BTreeNode<K>> {
        let guard = self.buffer_pool.fetch_page_guarded(page_id)?;
        let page = guard.read();
        deserialize_node(&page)
    }

    pub(crate) fn update_root(
        &self,
        root: &mut PageId,
        new_root: PageId,
    ) -> BTreeResult<()> {
        *root = new_root;
        self.directory.set_root(&self.name, new_root)
    }

    pub(crate) fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.buffer_pool
    }

    pub(crate) fn leaf_min_size(&self) -> usize {
        self.leaf_max_size / 2
    }

    pub(crate) fn internal_min_size(&self) -> usize {
        self.internal_max_size / 2
    }
}
