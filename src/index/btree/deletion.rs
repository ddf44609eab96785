use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{PageId, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeResult;
use crate::index::btree::index::BTreeIndex;
use crate::index::btree::node::{BTreeNode, InternalNode};
use crate::index::btree::serialization::{deserialize_node, serialize_node};

/// Outcome of a recursive remove below some node
enum RemoveResult {
    /// The key was absent; nothing changed
    NotFound,
    /// Removed without dropping the subtree's root below its minimum
    Done,
    /// The subtree's root is now under-full and needs rebalancing
    Underflow,
}

impl<K> BTreeIndex<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Remove a key. Absent keys are a no-op. Under-full nodes borrow from
    /// a sibling or merge with one; merges ascend, and the root collapses
    /// when it empties (leaf) or retains a single child (internal).
    pub fn remove(&self, key: &K) -> BTreeResult<()> {
        let mut root = self.root.lock();
        if *root == INVALID_PAGE_ID {
            return Ok(());
        }

        self.remove_entry(*root, key)?;

        // Root exception: shrink the tree instead of rebalancing
        match self.load_node(*root)? {
            BTreeNode::Leaf(leaf) if leaf.keys.is_empty() => {
                let old_root = *root;
                self.update_root(&mut *root, INVALID_PAGE_ID)?;
                self.buffer_pool().delete_page(old_root)?;
                debug!("btree {}: tree emptied", self.name());
            }
            BTreeNode::Internal(internal) if internal.children.len() == 1 => {
                let old_root = *root;
                self.update_root(&mut *root, internal.children[0])?;
                self.buffer_pool().delete_page(old_root)?;
                debug!("btree {}: root collapsed to {}", self.name(), *root);
            }
            _ => {}
        }

        Ok(())
    }

    fn remove_entry(&self, page_id: PageId, key: &K) -> BTreeResult<RemoveResult> {
        let guard = self.buffer_pool().fetch_page_guarded(page_id)?;
        let node: BTreeNode<K> = deserialize_node(&guard.read())?;

        match node {
            BTreeNode::Leaf(mut leaf) => {
                if !leaf.remove(key) {
                    return Ok(RemoveResult::NotFound);
                }

                let under = leaf.size() < self.leaf_min_size();
                serialize_node(&BTreeNode::Leaf(leaf), &mut guard.write())?;
                if under {
                    Ok(RemoveResult::Underflow)
                } else {
                    Ok(RemoveResult::Done)
                }
            }
            BTreeNode::Internal(mut internal) => {
                let ci = internal.child_index(key);
                let child = internal.children[ci];

                match self.remove_entry(child, key)? {
                    RemoveResult::NotFound => Ok(RemoveResult::NotFound),
                    RemoveResult::Done => Ok(RemoveResult::Done),
                    RemoveResult::Underflow => {
                        self.rebalance_child(&mut internal, ci)?;

                        let under = internal.size() < self.internal_min_size();
                        serialize_node(&BTreeNode::Internal(internal), &mut guard.write())?;
                        if under {
                            Ok(RemoveResult::Underflow)
                        } else {
                            Ok(RemoveResult::Done)
                        }
                    }
                }
            }
        }
    }

    /// Restore the minimum-size invariant for `parent.children[ci]`:
    /// borrow from the left sibling, else from the right, else merge.
    /// The caller re-serializes the parent.
    fn rebalance_child(&self, parent: &mut InternalNode<K>, ci: usize) -> BTreeResult<()> {
        let child_id = parent.children[ci];
        let child_guard = self.buffer_pool().fetch_page_guarded(child_id)?;
        let mut child: BTreeNode<K> = deserialize_node(&child_guard.read())?;

        // Borrow from the left sibling: its last entry becomes the child's
        // first, and the separator rotates through the parent.
        if ci > 0 {
            let left_id = parent.children[ci - 1];
            let left_guard = self.buffer_pool().fetch_page_guarded(left_id)?;
            let mut left: BTreeNode<K> = deserialize_node(&left_guard.read())?;

            if self.has_slack(&left) {
                match (&mut left, &mut child) {
                    (BTreeNode::Leaf(l), BTreeNode::Leaf(c)) => {
                        let key = l.keys.pop().expect("slack implies entries");
                        let value = l.values.pop().expect("slack implies entries");
                        c.keys.insert(0, key.clone());
                        c.values.insert(0, value);
                        parent.keys[ci - 1] = key;
                    }
                    (BTreeNode::Internal(l), BTreeNode::Internal(c)) => {
                        let moved = l.children.pop().expect("slack implies children");
                        let separator = l.keys.pop().expect("slack implies keys");
                        let pulled = std::mem::replace(&mut parent.keys[ci - 1], separator);
                        c.keys.insert(0, pulled);
                        c.children.insert(0, moved);
                    }
                    _ => unreachable!("siblings share a node kind"),
                }
                serialize_node(&left, &mut left_guard.write())?;
                serialize_node(&child, &mut child_guard.write())?;
                return Ok(());
            }
        }

        // Borrow from the right sibling: its first entry becomes the
        // child's last.
        if ci + 1 < parent.children.len() {
            let right_id = parent.children[ci + 1];
            let right_guard = self.buffer_pool().fetch_page_guarded(right_id)?;
            let mut right: BTreeNode<K> = deserialize_node(&right_guard.read())?;

            if self.has_slack(&right) {
                match (&mut child, &mut right) {
                    (BTreeNode::Leaf(c), BTreeNode::Leaf(r)) => {
                        c.keys.push(r.keys.remove(0));
                        c.values.push(r.values.remove(0));
                        parent.keys[ci] = r.keys[0].clone();
                    }
                    (BTreeNode::Internal(c), BTreeNode::Internal(r)) => {
                        let moved = r.children.remove(0);
                        let separator = r.keys.remove(0);
                        let pulled = std::mem::replace(&mut parent.keys[ci], separator);
                        c.keys.push(pulled);
                        c.children.push(moved);
                    }
                    _ => unreachable!("siblings share a node kind"),
                }
                serialize_node(&child, &mut child_guard.write())?;
                serialize_node(&right, &mut right_guard.write())?;
                return Ok(());
            }
        }

        // No sibling has slack: merge. Prefer absorbing the child into its
        // left sibling; otherwise pull the right sibling into the child.
        if ci > 0 {
            let left_id = parent.children[ci - 1];
            let left_guard = self.buffer_pool().fetch_page_guarded(left_id)?;
            let mut left: BTreeNode<K> = deserialize_node(&left_guard.read())?;

            match (&mut left, child) {
                (BTreeNode::Leaf(l), BTreeNode::Leaf(c)) => {
                    l.keys.extend(c.keys);
                    l.values.extend(c.values);
                    l.next_leaf = c.next_leaf;
                }
                (BTreeNode::Internal(l), BTreeNode::Internal(c)) => {
                    l.keys.push(parent.keys[ci - 1].clone());
                    l.keys.extend(c.keys);
                    l.children.extend(c.children);
                }
                _ => unreachable!("siblings share a node kind"),
            }
            parent.keys.remove(ci - 1);
            parent.children.remove(ci);

            serialize_node(&left, &mut left_guard.write())?;
            drop(child_guard);
            self.buffer_pool().delete_page(child_id)?;
            debug!("btree {}: merged page {} left", self.name(), child_id);
        } else {
            let right_id = parent.children[ci + 1];
            let right_guard = self.buffer_pool().fetch_page_guarded(right_id)?;
            let right: BTreeNode<K> = deserialize_node(&right_guard.read())?;

            match (&mut child, right) {
                (BTreeNode::Leaf(c), BTreeNode::Leaf(r)) => {
                    c.keys.extend(r.keys);
                    c.values.extend(r.values);
                    c.next_leaf = r.next_leaf;
                }
                (BTreeNode::Internal(c), BTreeNode::Internal(r)) => {
                    c.keys.push(parent.keys[ci].clone());
                    c.keys.extend(r.keys);
                    c.children.extend(r.children);
                }
                _ => unreachable!("siblings share a node kind"),
            }
            parent.keys.remove(ci);
            parent.children.remove(ci + 1);

            serialize_node(&child, &mut child_guard.write())?;
            drop(right_guard);
            self.buffer_pool().delete_page(right_id)?;
            debug!("btree {}: merged page {} right", self.name(), right_id);
        }

        Ok(())
    }

    fn has_slack(&self, node: &BTreeNode<K>) -> bool {
        match node {
            BTreeNode::Leaf(leaf) => leaf.size() > self.leaf_min_size(),
            BTreeNode::Internal(internal) => internal.size() > self.internal_min_size(),
        }
    }
}
