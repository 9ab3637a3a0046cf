//! Binary layout of a tree buffer.
//!
//! ```text
//! header (32) | node table | child-slot table | string pool
//! ```
//!
//! All integers are little-endian and records are packed. Optional ids are
//! stored as `u64::MAX` when absent.

use dstree_buffers::{Reader, Writer};

use crate::array::{ArraySchema, EmbeddedArray};
use crate::config::TreeConfig;
use crate::error::{DstreeError, Result};
use crate::value::NodeValue;

/// Index of a node in the node table.
pub type NodeId = u64;

/// Wire encoding of an absent id.
pub const NONE: u64 = u64::MAX;

pub const FORMAT_VERSION: u32 = 1;

pub const NODE_TABLE: usize = 0;
pub const CHILD_TABLE: usize = 1;
pub const STRING_POOL: usize = 2;

/// Element sizes of the three arrays following the header, in layout order.
pub const TREE_SCHEMA: ArraySchema =
    ArraySchema::new(&[NodeRecord::SIZE, ChildSlot::SIZE, 1]);

#[inline]
fn encode_opt(v: Option<u64>) -> u64 {
    v.unwrap_or(NONE)
}

#[inline]
fn decode_opt(v: u64) -> Option<u64> {
    (v != NONE).then_some(v)
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    /// Where the next node allocation scan starts.
    pub free_node_id: u64,
    /// Incremented after every node-table growth.
    pub node_array_growth_factor: u32,
    /// Constant exponent for child-range relocation.
    pub childs_array_growth_factor: u32,
}

impl Header {
    pub const SIZE: usize = 32;
    const RESERVED: usize = 12;

    pub fn new(config: &TreeConfig) -> Self {
        Self {
            version: FORMAT_VERSION,
            free_node_id: 0,
            node_array_growth_factor: config.node_growth_factor,
            childs_array_growth_factor: config.child_growth_factor,
        }
    }

    pub fn read(buf: &[u8]) -> Self {
        let mut r = Reader::new(buf);
        Self {
            version: r.u32(),
            free_node_id: r.u64(),
            node_array_growth_factor: r.u32(),
            childs_array_growth_factor: r.u32(),
        }
    }

    pub fn try_read(buf: &[u8]) -> Result<Self> {
        Reader::new(buf).try_buf(Self::SIZE)?;
        Ok(Self::read(buf))
    }

    pub fn write(&self, buf: &mut [u8]) {
        let mut w = Writer::at(buf, 0);
        w.u32(self.version);
        w.u64(self.free_node_id);
        w.u32(self.node_array_growth_factor);
        w.u32(self.childs_array_growth_factor);
        w.zeros(Self::RESERVED);
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new(&TreeConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Node record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeRecord {
    pub child_nodes_begin: Option<u64>,
    pub child_nodes_capacity: u32,
    /// Number of occupied slots at the front of the child range.
    pub child_nodes_size: u32,
    pub value: NodeValue,
    pub valid: bool,
    pub parent_node: Option<NodeId>,
}

impl NodeRecord {
    pub const SIZE: usize = 48;
    const RESERVED: usize = 14;

    /// Decodes the record at byte offset `at`. Unknown value tags decode as
    /// the default value; [`try_read`](Self::try_read) rejects them instead.
    pub fn read(buf: &[u8], at: usize) -> Self {
        let mut r = Reader::at(buf, at);
        let child_nodes_begin = decode_opt(r.u64());
        let child_nodes_capacity = r.u32();
        let child_nodes_size = r.u32();
        let tag = r.u8();
        let bits = r.u64();
        Self {
            child_nodes_begin,
            child_nodes_capacity,
            child_nodes_size,
            value: NodeValue::from_raw(tag, bits).unwrap_or_default(),
            valid: r.u8() != 0,
            parent_node: decode_opt(r.u64()),
        }
    }

    /// Bounds-checked decode that also rejects unknown tags on valid records.
    pub fn try_read(buf: &[u8], at: usize) -> Result<Self> {
        let mut r = Reader::at(buf, at);
        r.try_buf(Self::SIZE)?;
        let tag = buf[at + 16];
        let record = Self::read(buf, at);
        if record.valid && NodeValue::from_raw(tag, 0).is_none() {
            return Err(DstreeError::Malformed("unknown value tag"));
        }
        Ok(record)
    }

    pub fn write(&self, buf: &mut [u8], at: usize) {
        let mut w = Writer::at(buf, at);
        w.u64(encode_opt(self.child_nodes_begin));
        w.u32(self.child_nodes_capacity);
        w.u32(self.child_nodes_size);
        w.u8(self.value.tag());
        w.u64(self.value.bits());
        w.u8(self.valid as u8);
        w.u64(encode_opt(self.parent_node));
        w.zeros(Self::RESERVED);
    }

    /// Slot index one past the reserved child range.
    pub fn child_range_end(&self) -> u64 {
        self.child_nodes_begin.unwrap_or(0) + self.child_nodes_capacity as u64
    }
}

/// The tombstone state of an unallocated or destroyed node.
impl Default for NodeRecord {
    fn default() -> Self {
        Self {
            child_nodes_begin: None,
            child_nodes_capacity: 0,
            child_nodes_size: 0,
            value: NodeValue::default(),
            valid: false,
            parent_node: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Child slot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChildSlot {
    pub node_id: Option<NodeId>,
    /// Reserved by some node's range, as opposed to free for allocation.
    pub allocated: bool,
}

impl ChildSlot {
    pub const SIZE: usize = 12;
    const RESERVED: usize = 3;

    /// A reserved, empty slot.
    pub fn reserved() -> Self {
        Self {
            node_id: None,
            allocated: true,
        }
    }

    pub fn read(buf: &[u8], at: usize) -> Self {
        let mut r = Reader::at(buf, at);
        Self {
            node_id: decode_opt(r.u64()),
            allocated: r.u8() != 0,
        }
    }

    pub fn write(&self, buf: &mut [u8], at: usize) {
        let mut w = Writer::at(buf, at);
        w.u64(encode_opt(self.node_id));
        w.u8(self.allocated as u8);
        w.zeros(Self::RESERVED);
    }
}

// ---------------------------------------------------------------------------
// Array access
// ---------------------------------------------------------------------------

pub fn node_table(buf: &[u8]) -> EmbeddedArray {
    TREE_SCHEMA.array(buf, Header::SIZE, NODE_TABLE)
}

pub fn child_table(buf: &[u8]) -> EmbeddedArray {
    TREE_SCHEMA.array(buf, Header::SIZE, CHILD_TABLE)
}

pub fn string_pool(buf: &[u8]) -> EmbeddedArray {
    TREE_SCHEMA.array(buf, Header::SIZE, STRING_POOL)
}

pub fn read_node(buf: &[u8], id: NodeId) -> NodeRecord {
    let table = node_table(buf);
    NodeRecord::read(buf, table.element_offset(id))
}

pub fn write_node(buf: &mut [u8], id: NodeId, record: &NodeRecord) {
    let table = node_table(buf);
    record.write(buf, table.element_offset(id));
}

pub fn read_slot(buf: &[u8], index: u64) -> ChildSlot {
    let table = child_table(buf);
    ChildSlot::read(buf, table.element_offset(index))
}

pub fn write_slot(buf: &mut [u8], index: u64, slot: &ChildSlot) {
    let table = child_table(buf);
    slot.write(buf, table.element_offset(index));
}
