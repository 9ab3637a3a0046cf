//! Structural checks for buffers received from outside.

use dstree_buffers::Reader;

use crate::error::{DstreeError, Result};
use crate::layout::{
    child_table, node_table, read_node, read_slot, string_pool, Header, NodeRecord,
    FORMAT_VERSION, TREE_SCHEMA,
};
use crate::value::NodeValue;

/// Checks that `buf` is a well-formed tree buffer with a valid root at id 0.
///
/// After this passes, every structural operation can run on `buf` without
/// reading out of bounds or overwriting a live node.
pub fn validate_tree(buf: &[u8]) -> Result<()> {
    let header = Header::try_read(buf)?;
    if header.version != FORMAT_VERSION {
        return Err(DstreeError::UnsupportedVersion(header.version));
    }
    TREE_SCHEMA.try_offset_of(buf, Header::SIZE, TREE_SCHEMA.len())?;

    let nodes = node_table(buf);
    let node_count = nodes.len(buf);
    let slot_count = child_table(buf).len(buf);
    let pool = string_pool(buf);
    let pool = pool.payload(buf);

    if node_count == 0 {
        return Err(DstreeError::Malformed("empty node table"));
    }
    let root = NodeRecord::try_read(buf, nodes.element_offset(0))?;
    if !root.valid {
        return Err(DstreeError::Malformed("root node is not valid"));
    }
    if root.parent_node.is_some() {
        return Err(DstreeError::Malformed("root node has a parent"));
    }

    if header.free_node_id > node_count {
        return Err(DstreeError::Malformed("free node id past node table"));
    }
    if header.free_node_id < node_count
        && NodeRecord::try_read(buf, nodes.element_offset(header.free_node_id))?.valid
    {
        return Err(DstreeError::Malformed("free node id points at a live node"));
    }

    let mut ranges = Vec::new();
    for id in 0..node_count {
        let node = NodeRecord::try_read(buf, nodes.element_offset(id))?;
        if !node.valid {
            continue;
        }
        if let Some(parent) = node.parent_node {
            if parent >= node_count || !read_node(buf, parent).valid {
                return Err(DstreeError::Malformed("dangling parent link"));
            }
        }
        if node.child_nodes_size > node.child_nodes_capacity {
            return Err(DstreeError::Malformed("child count exceeds capacity"));
        }
        if node.child_nodes_capacity > 0 {
            let begin = node
                .child_nodes_begin
                .ok_or(DstreeError::Malformed("child range without start"))?;
            let end = begin
                .checked_add(node.child_nodes_capacity as u64)
                .filter(|&end| end <= slot_count)
                .ok_or(DstreeError::Malformed("child range out of bounds"))?;
            ranges.push((begin, end));

            let size = node.child_nodes_size as u64;
            let mut prev = None;
            for i in 0..node.child_nodes_capacity as u64 {
                let slot = read_slot(buf, begin + i);
                if !slot.allocated {
                    return Err(DstreeError::Malformed("unallocated slot in child range"));
                }
                if i >= size {
                    if slot.node_id.is_some() {
                        return Err(DstreeError::Malformed("occupied slot past child count"));
                    }
                    continue;
                }
                let child = slot
                    .node_id
                    .ok_or(DstreeError::Malformed("empty slot among children"))?;
                if child >= node_count {
                    return Err(DstreeError::Malformed("child id out of range"));
                }
                if prev.is_some_and(|prev| prev >= child) {
                    return Err(DstreeError::Malformed("children not sorted"));
                }
                let record = read_node(buf, child);
                if !record.valid || record.parent_node != Some(id) {
                    return Err(DstreeError::Malformed("child does not link back to parent"));
                }
                prev = Some(child);
            }
        }
        if let NodeValue::StringRef(pos) = node.value {
            let pos = usize::try_from(pos).unwrap_or(usize::MAX);
            Reader::at(pool, pos).try_cstr_utf8()?;
        }
    }

    ranges.sort_unstable();
    if ranges.windows(2).any(|w| w[0].1 > w[1].0) {
        return Err(DstreeError::Malformed("overlapping child ranges"));
    }
    Ok(())
}
