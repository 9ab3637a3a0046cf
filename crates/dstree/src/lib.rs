//! A tree whose entire state lives in one contiguous byte buffer.
//!
//! The buffer is the serialized form: saving or sending a tree is a byte copy,
//! and reading one back can alias the bytes without decoding anything.
//!
//! # Module layout
//!
//! | Module | Contents |
//! |--------|----------|
//! [`array`] | Growable arrays embedded back to back in a buffer |
//! [`layout`] | Header, node, child-slot codecs and the array schema |
//! [`strings`] | Zero-terminated string pool with in-place reuse |
//! [`tree`] | Node allocation, child ranges, insert and destroy |
//! [`validate`] | Checks for untrusted buffers |
//! [`handle`] | [`Dstree`], the caller-facing handle |
//!
//! Offsets into the buffer are never kept across a mutation. Node ids and
//! handles are the only stable references.

pub mod array;
pub mod config;
pub mod error;
pub mod handle;
pub mod layout;
pub mod strings;
pub mod tree;
pub mod validate;
pub mod value;

pub use config::TreeConfig;
pub use error::{DstreeError, Result};
pub use handle::{Dstree, OwningMode, ROOT_NODE_ID};
pub use layout::NodeId;
pub use value::{NodeValue, Value};
