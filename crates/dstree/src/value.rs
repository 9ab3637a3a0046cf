//! Node values, as seen by callers and as stored in the buffer.

use serde::{Deserialize, Serialize};

/// A node's value as exposed by the handle API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    /// Stored zero-terminated in the string pool, so it must be non-empty and
    /// free of NUL bytes. A lone terminator would read as free pool space.
    /// Anything else is rejected with `InvalidText`.
    Text(String),
}

impl Default for Value {
    fn default() -> Self {
        Value::Integer(0)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// The 9-byte tagged value stored inside a node record.
///
/// Strings live in the string pool; the record only keeps their offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeValue {
    Integer(i64),
    Float(f64),
    StringRef(u64),
}

impl NodeValue {
    pub const TAG_INTEGER: u8 = 0;
    pub const TAG_FLOAT: u8 = 1;
    pub const TAG_STRING: u8 = 2;

    pub fn tag(&self) -> u8 {
        match self {
            NodeValue::Integer(_) => Self::TAG_INTEGER,
            NodeValue::Float(_) => Self::TAG_FLOAT,
            NodeValue::StringRef(_) => Self::TAG_STRING,
        }
    }

    /// Raw little-endian payload bits.
    pub fn bits(&self) -> u64 {
        match *self {
            NodeValue::Integer(v) => v as u64,
            NodeValue::Float(v) => v.to_bits(),
            NodeValue::StringRef(pos) => pos,
        }
    }

    /// Rebuilds a value from its tag and payload. `None` for unknown tags.
    pub fn from_raw(tag: u8, bits: u64) -> Option<Self> {
        match tag {
            Self::TAG_INTEGER => Some(NodeValue::Integer(bits as i64)),
            Self::TAG_FLOAT => Some(NodeValue::Float(f64::from_bits(bits))),
            Self::TAG_STRING => Some(NodeValue::StringRef(bits)),
            _ => None,
        }
    }
}

impl Default for NodeValue {
    fn default() -> Self {
        NodeValue::Integer(0)
    }
}
