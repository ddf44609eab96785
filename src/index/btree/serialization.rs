use byteorder::{ByteOrder, LittleEndian};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{Page, PageId, Rid, PAGE_SIZE};
use crate::index::btree::error::{BTreeError, BTreeResult};
use crate::index::btree::node::{BTreeNode, InternalNode, LeafNode};

// Node layout:
// - tag: u8 (1 = leaf, 2 = internal)
// - key_count: u16
// - leaf only: next_leaf: i32
// - key_bytes_len: u32, then the bincode-encoded key vector
// - leaf: key_count rids (page_id i32 + slot u32)
//   internal: key_count + 1 child page ids (i32)
const TAG_LEAF: u8 = 1;
const TAG_INTERNAL: u8 = 2;

/// Serialize a node into a page buffer
pub fn serialize_node<K>(node: &BTreeNode<K>, page: &mut Page) -> BTreeResult<()>
where
    K: Serialize,
{
    page.data.fill(0);

    match node {
        BTreeNode::Leaf(leaf) => {
            page.data[0] = TAG_LEAF;
            LittleEndian::write_u16(&mut page.data[1..3], leaf.keys.len() as u16);
            LittleEndian::write_i32(&mut page.data[3..7], leaf.next_leaf);

            let mut offset = write_keys(&leaf.keys, page, 7)?;
            ensure_fits(offset + leaf.values.len() * 8)?;
            for rid in &leaf.values {
                LittleEndian::write_i32(&mut page.data[offset..offset + 4], rid.page_id);
                LittleEndian::write_u32(&mut page.data[offset + 4..offset + 8], rid.slot);
                offset += 8;
            }
        }
        BTreeNode::Internal(internal) => {
            page.data[0] = TAG_INTERNAL;
            LittleEndian::write_u16(&mut page.data[1..3], internal.keys.len() as u16);

            let mut offset = write_keys(&internal.keys, page, 3)?;
            ensure_fits(offset + internal.children.len() * 4)?;
            for child in &internal.children {
                LittleEndian::write_i32(&mut page.data[offset..offset + 4], *child);
                offset += 4;
            }
        }
    }

    Ok(())
}

/// Deserialize a node from a page buffer
pub fn deserialize_node<K>(page: &Page) -> BTreeResult<BTreeNode<K>>
where
    K: DeserializeOwned,
{
    let tag = page.data[0];
    let key_count = LittleEndian::read_u16(&page.data[1..3]) as usize;

    match tag {
        TAG_LEAF => {
            let next_leaf = LittleEndian::read_i32(&page.data[3..7]);
            let (keys, mut offset) = read_keys::<K>(page, 7)?;

            let mut values = Vec::with_capacity(key_count);
            for _ in 0..key_count {
                let page_id: PageId = LittleEndian::read_i32(&page.data[offset..offset + 4]);
                let slot = LittleEndian::read_u32(&page.data[offset + 4..offset + 8]);
                values.push(Rid::new(page_id, slot));
                offset += 8;
            }

            Ok(BTreeNode::Leaf(LeafNode {
                keys,
                values,
                next_leaf,
            }))
        }
        TAG_INTERNAL => {
            let (keys, mut offset) = read_keys::<K>(page, 3)?;

            let mut children = Vec::with_capacity(key_count + 1);
            for _ in 0..key_count + 1 {
                children.push(LittleEndian::read_i32(&page.data[offset..offset + 4]));
                offset += 4;
            }

            Ok(BTreeNode::Internal(InternalNode { keys, children }))
        }
        _ => Err(BTreeError::InvalidNode(page.page_id)),
    }
}

fn write_keys<K: Serialize>(keys: &[K], page: &mut Page, offset: usize) -> BTreeResult<usize> {
    let key_bytes =
        bincode::serialize(keys).map_err(|e| BTreeError::Serialization(e.to_string()))?;
    ensure_fits(offset + 4 + key_bytes.len())?;

    LittleEndian::write_u32(&mut page.data[offset..offset + 4], key_bytes.len() as u32);
    let start = offset + 4;
    page.data[start..start + key_bytes.len()].copy_from_slice(&key_bytes);
    Ok(start + key_bytes.len())
}

fn read_keys<K: DeserializeOwned>(page: &Page, offset: usize) -> BTreeResult<(Vec<K>, usize)> {
    let len = LittleEndian::read_u32(&page.data[offset..offset + 4]) as usize;
    let start = offset + 4;
    let keys = bincode::deserialize(&page.data[start..start + len])
        .map_err(|e| BTreeError::Deserialization(e.to_string()))?;
    Ok((keys, start + len))
}

fn ensure_fits(end: usize) -> BTreeResult<()> {
    if end > PAGE_SIZE {
        Err(BTreeError::NodeTooLarge)
    } else {
        Ok(())
    }
}
