use dstree_buffers::BufferError;
use thiserror::Error;

use crate::layout::NodeId;

/// Errors reported by the handle facade and buffer validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DstreeError {
    #[error("read-only tree: structural mutation requires owning mode")]
    ReadOnly,
    #[error("erase can only remove direct child nodes of this node")]
    NotAChild,
    #[error("serialization is only defined for root handles")]
    NotRoot,
    #[error("no matching child")]
    NotFound,
    #[error("handle refers to destroyed node {0}")]
    StaleHandle(NodeId),
    #[error("text values must be non-empty and free of NUL bytes")]
    InvalidText,
    #[error("capacity overflow while growing the tree buffer")]
    CapacityOverflow,
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),
    #[error("malformed tree buffer: {0}")]
    Malformed(&'static str),
    #[error("buffer access failed: {0}")]
    Buffer(#[from] BufferError),
}

pub type Result<T> = std::result::Result<T, DstreeError>;
