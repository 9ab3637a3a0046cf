#![allow(dead_code)]

use dstree::{Dstree, Value};

/// Value tree reachable from a handle, children in id order.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub value: Value,
    pub children: Vec<Snapshot>,
}

pub fn snapshot(tree: &Dstree<'_>) -> Snapshot {
    Snapshot {
        value: tree.data().expect("live node must resolve"),
        children: tree
            .children()
            .expect("live node must list children")
            .iter()
            .map(snapshot)
            .collect(),
    }
}

pub fn child_values(tree: &Dstree<'_>) -> Vec<Value> {
    tree.children()
        .expect("live node must list children")
        .iter()
        .map(|c| c.data().expect("child must resolve"))
        .collect()
}

pub fn child_ids(tree: &Dstree<'_>) -> Vec<u64> {
    tree.children()
        .expect("live node must list children")
        .iter()
        .map(Dstree::node_id)
        .collect()
}
