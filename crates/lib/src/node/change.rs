//! Structural change events delivered to deep-change listeners.

use std::fmt;

use crate::{node::Node, value::Value};

/// One structural change to a single node.
///
/// Values are reported as [`Value`]s: primitives directly, node children as
/// [`Value::Node`] handles. Removed or replaced nodes are reported detached.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A property was added to an object
    Add { key: String, value: Value },
    /// An existing object property was replaced
    Update { key: String, old: Value, new: Value },
    /// A property was deleted from an object
    Remove { key: String, old: Value },
    /// A list element was replaced in place
    ListUpdate { index: usize, old: Value, new: Value },
    /// List elements were removed and/or inserted at `index`
    Splice {
        index: usize,
        removed: Vec<Value>,
        added: Vec<Value>,
    },
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Add { .. } => ChangeKind::Add,
            Change::Update { .. } => ChangeKind::Update,
            Change::Remove { .. } => ChangeKind::Remove,
            Change::ListUpdate { .. } => ChangeKind::ListUpdate,
            Change::Splice { .. } => ChangeKind::Splice,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Update,
    Remove,
    ListUpdate,
    Splice,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Add => "add",
            ChangeKind::Update => "update",
            ChangeKind::Remove => "remove",
            ChangeKind::ListUpdate => "list-update",
            ChangeKind::Splice => "splice",
        };
        f.write_str(name)
    }
}

/// A change together with the node it happened on.
///
/// Listeners registered on an ancestor receive the event unchanged; use
/// [`Forest::parent_to_child_path`](crate::Forest::parent_to_child_path) to
/// locate `target` relative to the listening node.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub target: Node,
    pub change: Change,
}
