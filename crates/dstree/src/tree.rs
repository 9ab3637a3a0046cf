//! Structural operations on a tree buffer.
//!
//! Every function here trusts the ids it is given: they must refer to valid
//! nodes of `buf`. Checking that is the handle layer's job; passing a stale id
//! corrupts the tree or panics on an out-of-range index.

use dstree_buffers::Writer;
use tracing::{debug, trace};

use crate::array::COUNT_SIZE;
use crate::config::TreeConfig;
use crate::error::{DstreeError, Result};
use crate::layout::{
    child_table, node_table, read_node, read_slot, write_node, write_slot, ChildSlot, Header,
    NodeId, NodeRecord,
};
use crate::strings::destroy_string;
use crate::value::NodeValue;

/// Resets `buf` to a header, a node table with one free slot, and empty
/// child and string arrays.
pub fn init_empty_tree(buf: &mut Vec<u8>, config: &TreeConfig) {
    buf.clear();
    buf.resize(Header::SIZE + 3 * COUNT_SIZE + NodeRecord::SIZE, 0);
    Header::new(config).write(buf);
    Writer::at(buf, Header::SIZE).u64(1);
    NodeRecord::default().write(buf, Header::SIZE + COUNT_SIZE);
}

pub fn node_count(buf: &[u8]) -> u64 {
    node_table(buf).len(buf)
}

/// The record of `id`, or `None` past the end of the node table.
pub fn get_node(buf: &[u8], id: NodeId) -> Option<NodeRecord> {
    (id < node_count(buf)).then(|| read_node(buf, id))
}

pub fn is_valid_node(buf: &[u8], id: NodeId) -> bool {
    get_node(buf, id).is_some_and(|n| n.valid)
}

pub fn set_value(buf: &mut [u8], id: NodeId, value: NodeValue) {
    let mut node = read_node(buf, id);
    node.value = value;
    write_node(buf, id, &node);
}

// ---------------------------------------------------------------------------
// Node allocation
// ---------------------------------------------------------------------------

fn grow_node_table_if_needed(buf: &mut Vec<u8>) -> Result<()> {
    let table = node_table(buf);
    let mut header = Header::read(buf);
    let old_count = table.len(buf);
    if old_count > header.free_node_id {
        return Ok(());
    }

    let factor = header.node_array_growth_factor;
    let new_count = 1u64
        .checked_shl(factor)
        .and_then(|mul| old_count.checked_add(1)?.checked_mul(mul))
        .ok_or(DstreeError::CapacityOverflow)?;
    table.resize(buf, new_count)?;
    for id in old_count..new_count {
        NodeRecord::default().write(buf, table.element_offset(id));
    }

    header.node_array_growth_factor = factor.saturating_add(1);
    header.write(buf);
    debug!(old_count, new_count, growth_factor = factor, "grew node table");
    Ok(())
}

/// Claims the slot at the free watermark. The node table must already have
/// room past `free_node_id`.
pub(crate) fn allocate_node(buf: &mut [u8]) -> NodeId {
    let count = node_count(buf);
    let mut header = Header::read(buf);
    let id = header.free_node_id;
    header.free_node_id += 1;
    while header.free_node_id < count && read_node(buf, header.free_node_id).valid {
        header.free_node_id += 1;
    }
    header.write(buf);

    let node = NodeRecord {
        valid: true,
        ..NodeRecord::default()
    };
    write_node(buf, id, &node);
    trace!(id, "created node");
    id
}

/// Allocates a fresh, parentless node, preferring the lowest freed id.
pub fn create_node(buf: &mut Vec<u8>) -> Result<NodeId> {
    grow_node_table_if_needed(buf)?;
    Ok(allocate_node(buf))
}

fn release_id(buf: &mut [u8], id: NodeId) {
    write_node(buf, id, &NodeRecord::default());
    let mut header = Header::read(buf);
    if id < header.free_node_id {
        header.free_node_id = id;
        header.write(buf);
    }
}

/// Destroys `id` and its whole subtree, children before parents.
pub fn destroy_node(buf: &mut Vec<u8>, id: NodeId) {
    let mut order = Vec::new();
    let mut stack = vec![id];
    while let Some(node) = stack.pop() {
        order.push(node);
        stack.extend(valid_children(buf, node));
    }
    for &node in order.iter().rev() {
        destroy_single(buf, node);
    }
}

fn destroy_single(buf: &mut [u8], id: NodeId) {
    let node = read_node(buf, id);
    unlink_from_parent(buf, id, &node);
    if let Some(begin) = node.child_nodes_begin {
        free_child_range(buf, begin, node.child_nodes_capacity);
    }
    if let NodeValue::StringRef(pos) = node.value {
        destroy_string(buf, pos);
    }
    release_id(buf, id);
    trace!(id, "destroyed node");
}

/// Removes `id` from its parent's occupied prefix, keeping it sorted.
fn unlink_from_parent(buf: &mut [u8], id: NodeId, node: &NodeRecord) {
    let Some(parent_id) = node.parent_node else {
        return;
    };
    let mut parent = read_node(buf, parent_id);
    let Some(begin) = parent.child_nodes_begin else {
        return;
    };
    let size = parent.child_nodes_size as u64;
    let Some(pos) = (0..size).find(|&i| read_slot(buf, begin + i).node_id == Some(id)) else {
        return;
    };
    for i in pos..size - 1 {
        let next = read_slot(buf, begin + i + 1);
        write_slot(buf, begin + i, &next);
    }
    write_slot(buf, begin + size - 1, &ChildSlot::reserved());
    parent.child_nodes_size -= 1;
    write_node(buf, parent_id, &parent);
}

// ---------------------------------------------------------------------------
// Children
// ---------------------------------------------------------------------------

/// Ids of the occupied child slots of `id`, ascending.
pub fn valid_children(buf: &[u8], id: NodeId) -> Vec<NodeId> {
    let node = read_node(buf, id);
    let Some(begin) = node.child_nodes_begin else {
        return Vec::new();
    };
    (0..node.child_nodes_size as u64)
        .filter_map(|i| read_slot(buf, begin + i).node_id)
        .collect()
}

/// Inserts a new child of `parent_id` holding `value` and returns its id.
pub fn insert(buf: &mut Vec<u8>, parent_id: NodeId, value: NodeValue) -> Result<NodeId> {
    let child_id = create_node(buf)?;
    let mut child = read_node(buf, child_id);
    child.value = value;
    child.parent_node = Some(parent_id);
    write_node(buf, child_id, &child);

    if let Err(err) = ensure_child_capacity(buf, parent_id) {
        release_id(buf, child_id);
        return Err(err);
    }
    recount_children(buf, parent_id);
    add_child(buf, parent_id, child_id);
    Ok(child_id)
}

fn ensure_child_capacity(buf: &mut Vec<u8>, id: NodeId) -> Result<()> {
    let node = read_node(buf, id);
    let capacity = node.child_nodes_capacity as u64;
    if let Some(begin) = node.child_nodes_begin.filter(|_| capacity != 0) {
        if read_slot(buf, begin + capacity - 1).node_id.is_none() {
            return Ok(());
        }
    }
    relocate_child_range(buf, id, &node)
}

/// Moves the child range of `id` to a larger one, carrying its slots over.
fn relocate_child_range(buf: &mut Vec<u8>, id: NodeId, node: &NodeRecord) -> Result<()> {
    let factor = Header::read(buf).childs_array_growth_factor;
    let old_capacity = node.child_nodes_capacity;
    let new_capacity = 1u32
        .checked_shl(factor)
        .and_then(|mul| old_capacity.checked_add(1)?.checked_mul(mul))
        .ok_or(DstreeError::CapacityOverflow)?;

    let backup: Vec<ChildSlot> = match node.child_nodes_begin {
        Some(begin) => (0..old_capacity as u64)
            .map(|i| read_slot(buf, begin + i))
            .collect(),
        None => Vec::new(),
    };
    if let Some(begin) = node.child_nodes_begin {
        free_child_range(buf, begin, old_capacity);
    }

    let new_begin = match allocate_child_range(buf, new_capacity) {
        Ok(begin) => begin,
        Err(err) => {
            if let Some(begin) = node.child_nodes_begin {
                for (i, slot) in backup.iter().enumerate() {
                    write_slot(buf, begin + i as u64, slot);
                }
            }
            return Err(err);
        }
    };
    for (i, slot) in backup.iter().enumerate() {
        let slot = ChildSlot {
            node_id: slot.node_id,
            allocated: true,
        };
        write_slot(buf, new_begin + i as u64, &slot);
    }

    let mut node = read_node(buf, id);
    node.child_nodes_begin = Some(new_begin);
    node.child_nodes_capacity = new_capacity;
    write_node(buf, id, &node);
    debug!(
        id,
        old_capacity,
        new_capacity,
        begin = new_begin,
        "relocated child range"
    );
    Ok(())
}

fn recount_children(buf: &mut [u8], id: NodeId) {
    let mut node = read_node(buf, id);
    let begin = node.child_nodes_begin.unwrap_or(0);
    node.child_nodes_size = (0..node.child_nodes_capacity as u64)
        .filter(|&i| read_slot(buf, begin + i).node_id.is_some())
        .count() as u32;
    write_node(buf, id, &node);
}

/// Places `child_id` into the sorted occupied prefix of `id`.
fn add_child(buf: &mut [u8], id: NodeId, child_id: NodeId) {
    let mut node = read_node(buf, id);
    let Some(begin) = node.child_nodes_begin else {
        return;
    };
    if node.child_nodes_size >= node.child_nodes_capacity {
        return;
    }

    let mut i = node.child_nodes_size as u64;
    while i > 0 {
        let prev = read_slot(buf, begin + i - 1);
        if !prev.node_id.is_some_and(|prev_id| prev_id > child_id) {
            break;
        }
        write_slot(buf, begin + i, &prev);
        i -= 1;
    }
    let slot = ChildSlot {
        node_id: Some(child_id),
        allocated: true,
    };
    write_slot(buf, begin + i, &slot);

    node.child_nodes_size += 1;
    write_node(buf, id, &node);
}

// ---------------------------------------------------------------------------
// Child-range allocation
// ---------------------------------------------------------------------------

fn find_free_range(buf: &[u8], count: u64, size: u64) -> Option<u64> {
    let mut run = 0;
    for i in 0..count {
        if read_slot(buf, i).allocated {
            run = 0;
            continue;
        }
        run += 1;
        if run == size {
            return Some(i + 1 - size);
        }
    }
    None
}

/// Reserves `size` contiguous slots, first-fit, extending the table at the
/// tail when no free run is long enough. Returns the first slot index.
pub fn allocate_child_range(buf: &mut Vec<u8>, size: u32) -> Result<u64> {
    let table = child_table(buf);
    let count = table.len(buf);
    let size = size as u64;

    let begin = match find_free_range(buf, count, size) {
        Some(begin) => begin,
        None => {
            table.resize(buf, count + size)?;
            debug!(old_count = count, new_count = count + size, "extended child table");
            count
        }
    };
    for i in begin..begin + size {
        write_slot(buf, i, &ChildSlot::reserved());
    }
    Ok(begin)
}

/// Returns `size` slots starting at `begin` to the allocator.
pub fn free_child_range(buf: &mut [u8], begin: u64, size: u32) {
    for i in begin..begin + size as u64 {
        write_slot(buf, i, &ChildSlot::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::string_pool;
    use crate::strings::{create_string, get_string};

    fn empty_tree() -> Vec<u8> {
        let mut buf = Vec::new();
        init_empty_tree(&mut buf, &TreeConfig::default());
        buf
    }

    fn int(v: i64) -> NodeValue {
        NodeValue::Integer(v)
    }

    #[test]
    fn empty_tree_layout() {
        let buf = empty_tree();
        assert_eq!(buf.len(), 32 + 8 + 48 + 8 + 8);
        assert_eq!(node_count(&buf), 1);
        assert_eq!(child_table(&buf).len(&buf), 0);
        assert_eq!(string_pool(&buf).len(&buf), 0);
        assert_eq!(Header::read(&buf), Header::default());
        assert!(!is_valid_node(&buf, 0));
    }

    #[test]
    fn create_node_grows_geometrically() {
        let mut buf = empty_tree();
        assert_eq!(create_node(&mut buf).unwrap(), 0);
        assert_eq!(node_count(&buf), 1);

        assert_eq!(create_node(&mut buf).unwrap(), 1);
        // (1 + 1) << 1
        assert_eq!(node_count(&buf), 4);
        assert_eq!(Header::read(&buf).node_array_growth_factor, 2);

        create_node(&mut buf).unwrap();
        create_node(&mut buf).unwrap();
        assert_eq!(create_node(&mut buf).unwrap(), 4);
        // (4 + 1) << 2
        assert_eq!(node_count(&buf), 20);
        assert_eq!(Header::read(&buf).node_array_growth_factor, 3);
        assert!(!is_valid_node(&buf, 5));
    }

    #[test]
    fn insert_keeps_children_sorted_and_destroy_compacts() {
        let mut buf = empty_tree();
        assert_eq!(create_node(&mut buf).unwrap(), 0);
        assert_eq!(create_node(&mut buf).unwrap(), 1);

        for v in 1..=3 {
            insert(&mut buf, 0, int(v)).unwrap();
        }
        assert_eq!(valid_children(&buf, 0), vec![2, 3, 4]);

        insert(&mut buf, 0, int(4)).unwrap();
        assert_eq!(valid_children(&buf, 0), vec![2, 3, 4, 5]);

        destroy_node(&mut buf, 3);
        assert_eq!(valid_children(&buf, 0), vec![2, 4, 5]);
        assert_eq!(read_node(&buf, 0).child_nodes_size, 3);
        assert!(!is_valid_node(&buf, 3));
        assert_eq!(Header::read(&buf).free_node_id, 3);
    }

    #[test]
    fn freed_id_is_reused_before_fresh_ones() {
        let mut buf = empty_tree();
        create_node(&mut buf).unwrap();
        let a = insert(&mut buf, 0, int(1)).unwrap();
        let b = insert(&mut buf, 0, int(2)).unwrap();
        destroy_node(&mut buf, a);
        let c = insert(&mut buf, 0, int(3)).unwrap();
        assert_eq!(c, a);
        assert_eq!(valid_children(&buf, 0), vec![a, b]);
        assert_eq!(read_node(&buf, c).value, int(3));
    }

    #[test]
    fn reused_low_id_is_placed_in_sorted_position() {
        let mut buf = empty_tree();
        create_node(&mut buf).unwrap();
        let ids: Vec<_> = (0..4).map(|v| insert(&mut buf, 0, int(v)).unwrap()).collect();
        destroy_node(&mut buf, ids[0]);
        let again = insert(&mut buf, 0, int(9)).unwrap();
        assert_eq!(again, ids[0]);
        assert_eq!(valid_children(&buf, 0), ids);
    }

    #[test]
    fn child_range_relocates_when_full() {
        let mut buf = empty_tree();
        create_node(&mut buf).unwrap();
        insert(&mut buf, 0, int(1)).unwrap();
        let root = read_node(&buf, 0);
        assert_eq!(root.child_nodes_capacity, 2);
        assert_eq!(root.child_nodes_begin, Some(0));

        insert(&mut buf, 0, int(2)).unwrap();
        assert_eq!(read_node(&buf, 0).child_nodes_capacity, 2);

        insert(&mut buf, 0, int(3)).unwrap();
        let root = read_node(&buf, 0);
        // (2 + 1) << 1; the freed two-slot range is too short for six.
        assert_eq!(root.child_nodes_capacity, 6);
        assert_eq!(root.child_nodes_begin, Some(2));
        assert_eq!(root.child_nodes_size, 3);
        assert_eq!(read_slot(&buf, 0), ChildSlot::default());
        assert_eq!(read_slot(&buf, 1), ChildSlot::default());
        assert_eq!(valid_children(&buf, 0), vec![1, 2, 3]);
        // The child exponent is a constant; relocation leaves it as configured.
        assert_eq!(Header::read(&buf).childs_array_growth_factor, 1);
    }

    #[test]
    fn first_fit_reuses_freed_range() {
        let mut buf = empty_tree();
        let a = allocate_child_range(&mut buf, 3).unwrap();
        let b = allocate_child_range(&mut buf, 2).unwrap();
        assert_eq!((a, b), (0, 3));
        free_child_range(&mut buf, a, 3);

        assert_eq!(allocate_child_range(&mut buf, 2).unwrap(), 0);
        assert_eq!(allocate_child_range(&mut buf, 2).unwrap(), 5);
        assert!(read_slot(&buf, 2) == ChildSlot::default());
        assert_eq!(child_table(&buf).len(&buf), 7);
    }

    #[test]
    fn first_fit_accepts_run_at_table_tail() {
        let mut buf = empty_tree();
        let a = allocate_child_range(&mut buf, 2).unwrap();
        let b = allocate_child_range(&mut buf, 2).unwrap();
        free_child_range(&mut buf, b, 2);
        assert_eq!(allocate_child_range(&mut buf, 2).unwrap(), b);
        assert_eq!(a, 0);
        assert_eq!(child_table(&buf).len(&buf), 4);
    }

    #[test]
    fn destroy_removes_whole_subtree_and_frees_ranges() {
        let mut buf = empty_tree();
        create_node(&mut buf).unwrap();
        let mid = insert(&mut buf, 0, int(1)).unwrap();
        let leaves: Vec<_> = (0..5).map(|v| insert(&mut buf, mid, int(v)).unwrap()).collect();
        let deep = insert(&mut buf, leaves[2], int(7)).unwrap();

        destroy_node(&mut buf, mid);
        assert!(valid_children(&buf, 0).is_empty());
        for id in leaves.iter().copied().chain([mid, deep]) {
            assert!(!is_valid_node(&buf, id), "node {id} survived");
        }
        let table = child_table(&buf);
        let root_range = read_node(&buf, 0);
        for i in 0..table.len(&buf) {
            let inside_root = i >= root_range.child_nodes_begin.unwrap_or(0)
                && i < root_range.child_range_end();
            assert_eq!(read_slot(&buf, i).allocated, inside_root, "slot {i}");
        }
        assert_eq!(Header::read(&buf).free_node_id, mid);
    }

    #[test]
    fn destroy_releases_string_value() {
        let mut buf = empty_tree();
        create_node(&mut buf).unwrap();
        let pos = create_string(&mut buf, b"abcd").unwrap();
        let id = insert(&mut buf, 0, NodeValue::StringRef(pos)).unwrap();
        assert_eq!(get_string(&buf, pos), b"abcd");
        destroy_node(&mut buf, id);
        assert!(string_pool(&buf).payload(&buf).iter().all(|&b| b == 0));
    }

    #[test]
    fn set_value_overwrites_in_place() {
        let mut buf = empty_tree();
        create_node(&mut buf).unwrap();
        let len = buf.len();
        set_value(&mut buf, 0, NodeValue::Float(2.5));
        assert_eq!(read_node(&buf, 0).value, NodeValue::Float(2.5));
        assert_eq!(buf.len(), len);
    }

    #[test]
    fn get_node_past_end_is_none() {
        let mut buf = empty_tree();
        create_node(&mut buf).unwrap();
        assert!(get_node(&buf, 0).is_some());
        assert!(get_node(&buf, 1).is_none());
    }

    #[test]
    fn overflowing_child_growth_is_reported() {
        let mut buf = Vec::new();
        init_empty_tree(
            &mut buf,
            &TreeConfig {
                node_growth_factor: 1,
                child_growth_factor: 31,
            },
        );
        create_node(&mut buf).unwrap();
        let mut header = Header::read(&buf);
        header.childs_array_growth_factor = 40;
        header.write(&mut buf);

        assert_eq!(insert(&mut buf, 0, int(1)), Err(DstreeError::CapacityOverflow));
        assert!(valid_children(&buf, 0).is_empty());
        assert_eq!(Header::read(&buf).free_node_id, 1);
        assert!(!is_valid_node(&buf, 1));
    }
}
