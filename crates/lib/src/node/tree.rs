//! Tree queries: parents, roots, paths and traversal.
//!
//! Parent queries are reactive. The first query against a node lazily
//! creates its parent atom, after which attaching, detaching or re-indexing
//! the node re-runs observers that asked.

use super::{Node, arena::NodeId};
use crate::{
    Forest, Result,
    constants::TYPE_PROP,
    path::{ParentPath, PathSegment, RootPath, format_path},
    value::Value,
};

/// Traversal order for [`Forest::walk_tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// Visit a node before its children
    PreOrder,
    /// Visit a node after its children
    PostOrder,
}

/// Options for [`Forest::clone_node`].
#[derive(Debug, Clone, Copy)]
pub struct CloneOptions {
    /// Give keyed typed nodes in the copy fresh keys (default `true`).
    ///
    /// Without fresh keys the copy resolves to the live originals.
    pub regenerate_keys: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            regenerate_keys: true,
        }
    }
}

/// An ancestor found by [`Forest::find_parent_path`].
#[derive(Debug, Clone, PartialEq)]
pub struct FoundParent {
    pub parent: Node,
    /// Path from `parent` down to the queried node
    pub path: Vec<PathSegment>,
}

impl Forest {
    // ===== INTERNAL HELPERS =====

    pub(crate) fn parent_of(&self, id: NodeId) -> Option<(NodeId, PathSegment)> {
        self.with_node(id, |data| data.parent.clone()).ok().flatten()
    }

    pub(crate) fn root_id(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some((parent, _)) = self.parent_of(current) {
            current = parent;
        }
        current
    }

    /// Segments from the root down to `id`.
    pub(crate) fn path_segments(&self, id: NodeId) -> Vec<PathSegment> {
        let mut segments = Vec::new();
        let mut current = id;
        while let Some((parent, segment)) = self.parent_of(current) {
            segments.push(segment);
            current = parent;
        }
        segments.reverse();
        segments
    }

    pub(crate) fn location_string(&self, parent: NodeId, segment: &PathSegment) -> String {
        let mut segments = self.path_segments(parent);
        segments.push(segment.clone());
        format_path(&segments)
    }

    pub(crate) fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent_of(node);
        while let Some((parent, _)) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent_of(parent);
        }
        false
    }

    fn observe_parent(&self, id: NodeId) {
        let runtime = &self.inner.runtime;
        let atom = self.with_node_mut(id, |data| {
            *data.parent_atom.get_or_insert_with(|| runtime.create_atom())
        });
        if let Ok(atom) = atom {
            runtime.report_observed(atom);
        }
    }

    // ===== PARENTS AND ROOTS =====

    /// The node's parent and the segment it sits under; `None` for roots.
    pub fn parent_path(&self, node: &Node) -> Option<ParentPath> {
        let id = self.require(node).ok()?;
        self.observe_parent(id);
        let (parent, segment) = self.parent_of(id)?;
        Some(ParentPath {
            parent: self.handle(parent)?,
            segment,
        })
    }

    pub fn parent(&self, node: &Node) -> Option<Node> {
        self.parent_path(node).map(|location| location.parent)
    }

    /// Walks to the root, recording every node and segment on the way.
    pub fn root_path(&self, node: &Node) -> RootPath {
        let mut nodes = vec![node.clone()];
        let mut path = Vec::new();
        let mut current = node.clone();
        while let Some(ParentPath { parent, segment }) = self.parent_path(&current) {
            path.push(segment);
            nodes.push(parent.clone());
            current = parent;
        }
        path.reverse();
        nodes.reverse();
        RootPath {
            root: current,
            path,
            nodes,
        }
    }

    pub fn root(&self, node: &Node) -> Node {
        self.root_path(node).root
    }

    pub fn is_root(&self, node: &Node) -> bool {
        self.parent_path(node).is_none()
    }

    /// The node's location from its root, e.g. `/todos/0`.
    pub fn path_string(&self, node: &Node) -> String {
        format_path(&self.root_path(node).path)
    }

    pub fn is_child_of_parent(&self, child: &Node, parent: &Node) -> bool {
        self.parent(child).is_some_and(|actual| actual == *parent)
    }

    pub fn is_parent_of_child(&self, parent: &Node, child: &Node) -> bool {
        self.is_child_of_parent(child, parent)
    }

    /// Path from `parent` down to `child`, or `None` if `parent` is not an
    /// ancestor. The path from a node to itself is empty.
    pub fn parent_to_child_path(&self, parent: &Node, child: &Node) -> Option<Vec<PathSegment>> {
        if parent == child {
            return Some(Vec::new());
        }
        let mut path = Vec::new();
        let mut current = child.clone();
        loop {
            let ParentPath {
                parent: up,
                segment,
            } = self.parent_path(&current)?;
            path.push(segment);
            if up == *parent {
                path.reverse();
                return Some(path);
            }
            current = up;
        }
    }

    /// Follows `path` from `node`. Returns `None` as soon as a segment does
    /// not resolve.
    pub fn resolve_path(&self, node: &Node, path: &[PathSegment]) -> Option<Value> {
        let mut current = Value::Node(node.clone());
        for segment in path {
            let container = current.into_node()?;
            current = match segment {
                PathSegment::Key(key) => self.get(&container, key)?,
                PathSegment::Index(index) => self.at(&container, *index)?,
            };
        }
        Some(current)
    }

    /// Nearest ancestor satisfying `predicate`, searching at most
    /// `max_depth` levels up when given.
    pub fn find_parent(
        &self,
        node: &Node,
        predicate: impl Fn(&Node) -> bool,
        max_depth: Option<usize>,
    ) -> Option<Node> {
        self.find_parent_path(node, predicate, max_depth)
            .map(|found| found.parent)
    }

    pub fn find_parent_path(
        &self,
        node: &Node,
        predicate: impl Fn(&Node) -> bool,
        max_depth: Option<usize>,
    ) -> Option<FoundParent> {
        let mut path = Vec::new();
        let mut current = node.clone();
        while let Some(ParentPath { parent, segment }) = self.parent_path(&current) {
            path.push(segment);
            if max_depth.is_some_and(|max| path.len() > max) {
                return None;
            }
            if predicate(&parent) {
                path.reverse();
                return Some(FoundParent { parent, path });
            }
            current = parent;
        }
        None
    }

    // ===== CHILDREN =====

    /// Direct child nodes in content order.
    pub fn children(&self, node: &Node) -> Vec<Node> {
        self.items(node)
            .into_iter()
            .filter_map(Value::into_node)
            .collect()
    }

    /// Child nodes satisfying `predicate`; with `deep`, all descendants.
    pub fn find_children(
        &self,
        node: &Node,
        predicate: impl Fn(&Node) -> bool,
        deep: bool,
    ) -> Vec<Node> {
        let mut found = Vec::new();
        let mut stack = self.children(node);
        stack.reverse();
        while let Some(child) = stack.pop() {
            if predicate(&child) {
                found.push(child.clone());
            }
            if deep {
                let mut grandchildren = self.children(&child);
                grandchildren.reverse();
                stack.extend(grandchildren);
            }
        }
        found
    }

    /// Visits `node` and its descendants until `visit` returns `Some`.
    pub fn walk_tree<T>(
        &self,
        node: &Node,
        mode: WalkMode,
        mut visit: impl FnMut(&Node) -> Option<T>,
    ) -> Option<T> {
        self.walk(node, mode, &mut visit)
    }

    fn walk<T>(
        &self,
        node: &Node,
        mode: WalkMode,
        visit: &mut dyn FnMut(&Node) -> Option<T>,
    ) -> Option<T> {
        if mode == WalkMode::PreOrder {
            if let Some(found) = visit(node) {
                return Some(found);
            }
        }
        for child in self.children(node) {
            if let Some(found) = self.walk(&child, mode, visit) {
                return Some(found);
            }
        }
        match mode {
            WalkMode::PostOrder => visit(node),
            WalkMode::PreOrder => None,
        }
    }

    // ===== CLONING =====

    /// Creates a detached deep copy of `node` from its snapshot.
    pub fn clone_node(&self, node: &Node, options: CloneOptions) -> Result<Node> {
        let mut value = self.snapshot(node)?.to_value();
        if options.regenerate_keys {
            self.regenerate_keys(&mut value);
        }
        self.wrap(value)
    }

    fn regenerate_keys(&self, value: &mut Value) {
        match value {
            Value::List(items) => items.iter_mut().for_each(|item| self.regenerate_keys(item)),
            Value::Object(map) => {
                let key_prop = map
                    .get(TYPE_PROP)
                    .and_then(Value::as_text)
                    .and_then(|tag| self.node_type(tag))
                    .and_then(|node_type| node_type.key_prop().map(str::to_string));
                if let Some(key_prop) = key_prop {
                    map.insert(key_prop, Value::Text(self.config().generate_key()));
                }
                map.values_mut().for_each(|child| self.regenerate_keys(child));
            }
            _ => {}
        }
    }
}
