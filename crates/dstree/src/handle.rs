//! Caller-facing handles over a tree buffer.
//!
//! A [`Dstree`] is either the root of a tree, or a descendant made of a shared
//! reference to the root storage plus a node id. Handles never hold offsets:
//! every call re-resolves its node through the buffer, so they stay usable
//! across any growth of the underlying arrays.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::TreeConfig;
use crate::error::{DstreeError, Result};
use crate::layout::NodeId;
use crate::strings::{create_string, destroy_string, get_string, try_get_str};
use crate::tree;
use crate::validate::validate_tree;
use crate::value::{NodeValue, Value};

/// Id of the root node in every tree built by this crate.
pub const ROOT_NODE_ID: NodeId = 0;

/// Whether a root handle owns its buffer or borrows caller memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OwningMode {
    /// The tree holds a private, resizable copy of its buffer.
    #[default]
    Owning,
    /// The tree aliases a caller-supplied, read-only byte slice.
    NonOwning,
}

enum Storage<'a> {
    Owned(Vec<u8>),
    Aliased(&'a [u8]),
}

impl Storage<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(buf) => buf,
            Storage::Aliased(buf) => buf,
        }
    }

    fn owned_mut(&mut self) -> Result<&mut Vec<u8>> {
        match self {
            Storage::Owned(buf) => Ok(buf),
            Storage::Aliased(_) => Err(DstreeError::ReadOnly),
        }
    }

    fn mode(&self) -> OwningMode {
        match self {
            Storage::Owned(_) => OwningMode::Owning,
            Storage::Aliased(_) => OwningMode::NonOwning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleKind {
    Root,
    Descendant(NodeId),
}

/// A handle to one node of a tree stored in a single byte buffer.
///
/// # Example
///
/// ```
/// use dstree::{Dstree, OwningMode, Value};
///
/// let tree = Dstree::with_value(8i64).unwrap();
/// tree.insert(2.015).unwrap();
/// let node = tree.insert(1000i64).unwrap();
/// node.insert("abcd").unwrap();
///
/// let bytes = tree.to_bytes().unwrap();
/// let copy = Dstree::deserialize(&bytes, OwningMode::NonOwning).unwrap();
/// let found = copy.find(1000i64).unwrap().find("abcd").unwrap();
/// assert_eq!(found.data().unwrap(), Value::from("abcd"));
/// ```
pub struct Dstree<'a> {
    root: Rc<RefCell<Storage<'a>>>,
    kind: HandleKind,
}

impl Dstree<'static> {
    /// A fresh owning tree with a single root node holding `Integer(0)`.
    pub fn new() -> Self {
        Self::build(&TreeConfig::default())
    }

    /// A fresh owning tree whose root holds `value`.
    pub fn with_value(value: impl Into<Value>) -> Result<Self> {
        let tree = Self::new();
        tree.set_data(value)?;
        Ok(tree)
    }

    /// A fresh owning tree with custom growth settings.
    pub fn with_config(config: TreeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(&config))
    }

    fn build(config: &TreeConfig) -> Self {
        let mut buf = Vec::new();
        tree::init_empty_tree(&mut buf, config);
        tree::allocate_node(&mut buf);
        Self::from_storage(Storage::Owned(buf))
    }

    /// Takes ownership of a serialized tree without copying it.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        check_incoming(&bytes)?;
        Ok(Self::from_storage(Storage::Owned(bytes)))
    }
}

impl Default for Dstree<'static> {
    fn default() -> Self {
        Self::new()
    }
}

fn check_incoming(bytes: &[u8]) -> Result<()> {
    validate_tree(bytes).inspect_err(|err| {
        warn!(len = bytes.len(), error = %err, "rejected tree buffer");
    })
}

/// Converts a caller value into its in-buffer form, interning text.
fn intern(buf: &mut Vec<u8>, value: &Value) -> Result<NodeValue> {
    Ok(match value {
        Value::Integer(v) => NodeValue::Integer(*v),
        Value::Float(v) => NodeValue::Float(*v),
        Value::Text(text) => {
            if text.is_empty() || text.as_bytes().contains(&0) {
                return Err(DstreeError::InvalidText);
            }
            NodeValue::StringRef(create_string(buf, text.as_bytes())?)
        }
    })
}

fn resolve_value(buf: &[u8], value: NodeValue) -> Result<Value> {
    Ok(match value {
        NodeValue::Integer(v) => Value::Integer(v),
        NodeValue::Float(v) => Value::Float(v),
        NodeValue::StringRef(pos) => Value::Text(try_get_str(buf, pos)?.to_owned()),
    })
}

/// Compares a stored value against `value` without materialising strings.
fn value_matches(buf: &[u8], stored: NodeValue, value: &Value) -> bool {
    match (stored, value) {
        (NodeValue::Integer(a), Value::Integer(b)) => a == *b,
        (NodeValue::Float(a), Value::Float(b)) => a == *b,
        (NodeValue::StringRef(pos), Value::Text(text)) => get_string(buf, pos) == text.as_bytes(),
        _ => false,
    }
}

impl<'a> Dstree<'a> {
    fn from_storage(storage: Storage<'a>) -> Self {
        Self {
            root: Rc::new(RefCell::new(storage)),
            kind: HandleKind::Root,
        }
    }

    /// Opens a serialized tree.
    ///
    /// [`OwningMode::Owning`] copies `bytes`; [`OwningMode::NonOwning`] aliases
    /// them, and the resulting tree rejects every mutation.
    pub fn deserialize(bytes: &'a [u8], mode: OwningMode) -> Result<Self> {
        check_incoming(bytes)?;
        let storage = match mode {
            OwningMode::Owning => Storage::Owned(bytes.to_vec()),
            OwningMode::NonOwning => Storage::Aliased(bytes),
        };
        Ok(Self::from_storage(storage))
    }

    /// Copies up to `dest.len()` bytes of the buffer into `dest` and returns
    /// the full buffer length. Pass `None` to query the length alone.
    pub fn serialize(&self, dest: Option<&mut [u8]>) -> Result<usize> {
        if self.kind != HandleKind::Root {
            return Err(DstreeError::NotRoot);
        }
        let storage = self.root.borrow();
        let bytes = storage.bytes();
        if let Some(dest) = dest {
            let n = bytes.len().min(dest.len());
            dest[..n].copy_from_slice(&bytes[..n]);
        }
        Ok(bytes.len())
    }

    /// The whole buffer as an owned byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = vec![0; self.serialize(None)?];
        self.serialize(Some(&mut out))?;
        Ok(out)
    }

    pub fn node_id(&self) -> NodeId {
        match self.kind {
            HandleKind::Root => ROOT_NODE_ID,
            HandleKind::Descendant(id) => id,
        }
    }

    pub fn is_root(&self) -> bool {
        self.kind == HandleKind::Root
    }

    pub fn mode(&self) -> OwningMode {
        self.root.borrow().mode()
    }

    fn descendant(&self, id: NodeId) -> Dstree<'a> {
        Dstree {
            root: Rc::clone(&self.root),
            kind: HandleKind::Descendant(id),
        }
    }

    /// This handle's node id, checked against the live buffer.
    fn resolve(&self, buf: &[u8]) -> Result<NodeId> {
        let id = self.node_id();
        if tree::is_valid_node(buf, id) {
            Ok(id)
        } else {
            Err(DstreeError::StaleHandle(id))
        }
    }

    pub fn data(&self) -> Result<Value> {
        let storage = self.root.borrow();
        let buf = storage.bytes();
        let id = self.resolve(buf)?;
        let node = tree::get_node(buf, id).ok_or(DstreeError::StaleHandle(id))?;
        resolve_value(buf, node.value)
    }

    /// Overwrites this node's value. A replaced string stays in the pool.
    pub fn set_data(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let mut storage = self.root.borrow_mut();
        let buf = storage.owned_mut()?;
        let id = self.resolve(buf.as_slice())?;
        let stored = intern(buf, &value)?;
        tree::set_value(buf, id, stored);
        Ok(())
    }

    /// Adds a child holding `value` and returns a handle to it.
    pub fn insert(&self, value: impl Into<Value>) -> Result<Dstree<'a>> {
        let value = value.into();
        let child = {
            let mut storage = self.root.borrow_mut();
            let buf = storage.owned_mut()?;
            let parent = self.resolve(buf.as_slice())?;
            let stored = intern(buf, &value)?;
            match tree::insert(buf, parent, stored) {
                Ok(child) => child,
                Err(err) => {
                    if let NodeValue::StringRef(pos) = stored {
                        destroy_string(buf, pos);
                    }
                    return Err(err);
                }
            }
        };
        Ok(self.descendant(child))
    }

    /// Handles to the direct children, in ascending id order.
    pub fn children(&self) -> Result<Vec<Dstree<'a>>> {
        let ids = {
            let storage = self.root.borrow();
            let buf = storage.bytes();
            let id = self.resolve(buf)?;
            tree::valid_children(buf, id)
        };
        Ok(ids.into_iter().map(|id| self.descendant(id)).collect())
    }

    pub fn child_count(&self) -> Result<usize> {
        let storage = self.root.borrow();
        let buf = storage.bytes();
        let id = self.resolve(buf)?;
        let node = tree::get_node(buf, id).ok_or(DstreeError::StaleHandle(id))?;
        Ok(node.child_nodes_size as usize)
    }

    /// Calls `f` for each direct child, in ascending id order.
    ///
    /// The child list is taken before the first call, so `f` may modify the
    /// tree.
    pub fn for_each_child<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&Dstree<'a>),
    {
        for child in self.children()? {
            f(&child);
        }
        Ok(())
    }

    fn matching_children(&self, value: &Value) -> Result<Vec<NodeId>> {
        let storage = self.root.borrow();
        let buf = storage.bytes();
        let id = self.resolve(buf)?;
        Ok(tree::valid_children(buf, id)
            .into_iter()
            .filter(|&child| {
                tree::get_node(buf, child).is_some_and(|n| value_matches(buf, n.value, value))
            })
            .collect())
    }

    /// Calls `f` for each direct child whose value equals `value`.
    pub fn for_each_matching_child<F>(&self, value: impl Into<Value>, mut f: F) -> Result<()>
    where
        F: FnMut(&Dstree<'a>),
    {
        for id in self.matching_children(&value.into())? {
            f(&self.descendant(id));
        }
        Ok(())
    }

    /// The first direct child, by id, whose value equals `value`.
    pub fn find(&self, value: impl Into<Value>) -> Result<Dstree<'a>> {
        self.matching_children(&value.into())?
            .first()
            .map(|&id| self.descendant(id))
            .ok_or(DstreeError::NotFound)
    }

    /// Destroys `child` and its entire subtree. `child` must be a direct
    /// child of this node.
    pub fn erase(&self, child: &Dstree<'a>) -> Result<()> {
        let HandleKind::Descendant(child_id) = child.kind else {
            return Err(DstreeError::NotAChild);
        };
        if !Rc::ptr_eq(&self.root, &child.root) {
            return Err(DstreeError::NotAChild);
        }
        let mut storage = self.root.borrow_mut();
        let buf = storage.owned_mut()?;
        let parent = self.resolve(buf.as_slice())?;
        let node = tree::get_node(buf, child_id)
            .filter(|n| n.valid)
            .ok_or(DstreeError::StaleHandle(child_id))?;
        if node.parent_node != Some(parent) {
            return Err(DstreeError::NotAChild);
        }
        tree::destroy_node(buf, child_id);
        Ok(())
    }
}

impl fmt::Debug for Dstree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dstree")
            .field("node_id", &self.node_id())
            .field("root", &self.is_root())
            .field("mode", &self.mode())
            .finish()
    }
}
