//! Observable tree nodes.
//!
//! A [`Node`] is a handle to an observable list or object stored in a
//! [`Forest`]. Every node has at most one parent; its location is the
//! `(parent, segment)` pair it is attached under. Reads are reactive:
//! reading a node's content inside an autorun or computed subscribes to it.
//!
//! Most operations are available both as methods on [`Forest`] taking a
//! `&Node`, and as convenience methods on [`Node`] itself:
//!
//! ```
//! use canopy::Forest;
//! use serde_json::json;
//!
//! let forest = Forest::new();
//! let todos = forest.wrap(json!({ "items": [] })).unwrap();
//! let items = todos.child("items").unwrap();
//! items.push(json!({ "title": "write docs" })).unwrap();
//!
//! assert_eq!(items.len(), 1);
//! assert_eq!(todos.snapshot().unwrap(), json!({ "items": [{ "title": "write docs" }] }));
//! ```

pub(crate) mod arena;
mod change;
mod engine;
mod errors;
mod tree;

use std::{fmt, hash, rc::Rc};

pub use arena::NodeId;
pub use change::{Change, ChangeEvent, ChangeKind};
pub use errors::NodeError;
pub use tree::{CloneOptions, FoundParent, WalkMode};

use crate::{
    Forest, Result,
    disposer::Disposer,
    path::{ParentPath, PathSegment, RootPath},
    snapshot::Snapshot,
    value::Value,
};

/// Handle to a live node.
///
/// Cloning a handle is cheap. While any handle to a node exists the node is
/// never garbage collected, even when detached.
#[derive(Clone)]
pub struct Node {
    forest: Forest,
    id: NodeId,
    _pin: Rc<()>,
}

impl Node {
    pub(crate) fn from_parts(forest: Forest, id: NodeId, pin: Rc<()>) -> Self {
        Self {
            forest,
            id,
            _pin: pin,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    // ===== READS =====

    pub fn get(&self, key: &str) -> Option<Value> {
        self.forest.get(self, key)
    }

    pub fn at(&self, index: usize) -> Option<Value> {
        self.forest.at(self, index)
    }

    /// The child node under `key`, if that property holds a node.
    pub fn child(&self, key: &str) -> Option<Node> {
        self.get(key)?.into_node()
    }

    /// The child node at `index`, if that element is a node.
    pub fn child_at(&self, index: usize) -> Option<Node> {
        self.at(index)?.into_node()
    }

    pub fn len(&self) -> usize {
        self.forest.len(self)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.forest.keys(self)
    }

    pub fn items(&self) -> Vec<Value> {
        self.forest.items(self)
    }

    pub fn is_list(&self) -> bool {
        self.forest.is_list(self)
    }

    pub fn is_object(&self) -> bool {
        self.forest.is_object(self)
    }

    // ===== WRITES =====

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.forest.set(self, key, value)
    }

    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        self.forest.remove(self, key)
    }

    pub fn set_index(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.forest.set_index(self, index, value)
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        self.forest.push(self, value)
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.forest.insert(self, index, value)
    }

    pub fn pop(&self) -> Result<Option<Value>> {
        self.forest.pop(self)
    }

    pub fn remove_at(&self, index: usize) -> Result<Value> {
        self.forest.remove_at(self, index)
    }

    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>> {
        self.forest.splice(self, start, delete_count, items)
    }

    // ===== TREE =====

    pub fn parent(&self) -> Option<Node> {
        self.forest.parent(self)
    }

    pub fn parent_path(&self) -> Option<ParentPath> {
        self.forest.parent_path(self)
    }

    pub fn root(&self) -> Node {
        self.forest.root(self)
    }

    pub fn root_path(&self) -> RootPath {
        self.forest.root_path(self)
    }

    pub fn is_root(&self) -> bool {
        self.forest.is_root(self)
    }

    pub fn path_string(&self) -> String {
        self.forest.path_string(self)
    }

    pub fn resolve_path(&self, path: &[PathSegment]) -> Option<Value> {
        self.forest.resolve_path(self, path)
    }

    // ===== SNAPSHOTS AND EVENTS =====

    pub fn snapshot(&self) -> Result<Snapshot> {
        self.forest.snapshot(self)
    }

    pub fn apply_snapshot(&self, data: impl Into<Value>) -> Result<()> {
        self.forest.apply_snapshot(self, data)
    }

    pub fn on_deep_change(&self, listener: impl Fn(&ChangeEvent) + 'static) -> Result<Disposer> {
        self.forest.on_deep_change(self, listener)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.forest.ptr_eq(&other.forest)
    }
}

impl Eq for Node {}

impl hash::Hash for Node {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Node").field(&self.id).finish()
    }
}
