//! Minimal-change reconciliation of nodes against plain data.
//!
//! [`Forest::apply_snapshot`] rewrites a node so that its snapshot equals the
//! given data while keeping as many existing nodes as possible:
//!
//! - primitives and identical node references are kept when unchanged,
//! - object data with the same type tag and key as the current child (or
//!   naming a live keyed instance that is detached or in the same tree) is
//!   merged into that node rather than replacing it; an instance attached
//!   in another tree is an error and is left untouched,
//! - lists are truncated to the new length, reconciled element-wise and
//!   then extended.
//!
//! When a keyed node moves to a different slot of the same tree, its old
//! slot is cleared first so the move never trips the single-parent rule.
//! Swapping two keyed elements therefore preserves both node identities.

mod errors;

use std::collections::BTreeMap;

use tracing::debug;

pub use errors::ReconcileError;

use crate::{
    Forest, Result,
    constants::TYPE_PROP,
    node::{Node, NodeId, arena::Content},
    path::PathSegment,
    types::{describe_key, describe_tag},
    value::Value,
};

impl Forest {
    /// Reconciles `node` with `data` inside an action.
    ///
    /// Fails if the shapes differ (object vs list) or if the data would
    /// change the node's type tag or key.
    pub fn apply_snapshot(&self, node: &Node, data: impl Into<Value>) -> Result<()> {
        let id = self.require(node)?;
        let data = data.into();
        debug!(node = %id, "applying snapshot");
        self.action(|| {
            let root = self.root_id(id);
            let is_list = self.with_node(id, |data| data.content.is_list())?;
            match data {
                Value::Node(other) if other == *node => Ok(()),
                Value::Object(map) if !is_list => {
                    self.check_identity(id, &map)?;
                    self.merge_object(id, map, root)
                }
                Value::List(items) if is_list => self.merge_list(id, items, root),
                other => Err(ReconcileError::ShapeMismatch {
                    expected: if is_list { "list" } else { "object" },
                    actual: other.type_name(),
                }
                .into()),
            }
        })
    }

    fn check_identity(&self, id: NodeId, map: &BTreeMap<String, Value>) -> Result<()> {
        let (tag, key) = self.node_identity(id);
        let (new_tag, new_key) = self.data_identity(map);
        if tag != new_tag {
            return Err(ReconcileError::IdentityChange {
                field: TYPE_PROP.to_string(),
                from: describe_tag(tag.as_ref()),
                to: describe_tag(new_tag.as_ref()),
            }
            .into());
        }
        let key_prop = self.type_def_of(id).and_then(|def| def.key_prop.clone());
        if let Some(key_prop) = key_prop {
            if key != new_key {
                return Err(ReconcileError::IdentityChange {
                    field: key_prop,
                    from: describe_key(key.as_ref()),
                    to: describe_key(new_key.as_ref()),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Returns what should occupy `slot` (currently holding `old`) so that
    /// it snapshots as `new`. Existing nodes are reconciled in place and
    /// returned as [`Value::Node`]; anything else is returned as data to be
    /// written.
    ///
    /// A live keyed instance is only merged when it can move into the slot:
    /// instances attached in another tree are rejected untouched.
    pub(crate) fn reconcile_value(
        &self,
        old: &Value,
        new: Value,
        root: NodeId,
        slot: (NodeId, &PathSegment),
    ) -> Result<Value> {
        match new {
            Value::Object(map) => {
                if let Some(existing) = self.live_keyed_instance(&map) {
                    self.ensure_claimable(existing, Some(slot), Some(root))?;
                    self.merge_object(existing, map, root)?;
                    return Ok(Value::Node(self.handle_or_err(existing)?));
                }
                if let Value::Node(node) = old {
                    let id = node.id();
                    if self.is_object(node) && self.node_identity(id) == self.data_identity(&map) {
                        self.merge_object(id, map, root)?;
                        return Ok(old.clone());
                    }
                }
                Ok(Value::Object(map))
            }
            Value::List(items) => {
                if let Value::Node(node) = old {
                    if self.is_list(node) {
                        self.merge_list(node.id(), items, root)?;
                        return Ok(old.clone());
                    }
                }
                Ok(Value::List(items))
            }
            other => Ok(other),
        }
    }

    pub(crate) fn merge_object(
        &self,
        id: NodeId,
        map: BTreeMap<String, Value>,
        root: NodeId,
    ) -> Result<()> {
        let existing: Vec<String> = self.with_node(id, |data| match &data.content {
            Content::Object(object) => object.keys().cloned().collect(),
            Content::List(_) => Vec::new(),
        })?;
        for key in existing {
            if !map.contains_key(&key) {
                self.remove_key(id, &key)?;
            }
        }
        for (key, value) in map {
            self.reconcile_slot_at(id, PathSegment::Key(key), value, root)?;
        }
        Ok(())
    }

    pub(crate) fn merge_list(&self, id: NodeId, items: Vec<Value>, root: NodeId) -> Result<()> {
        let old_len = self.list_len_of(id)?;
        if old_len > items.len() {
            self.splice_items(id, items.len(), old_len - items.len(), Vec::new())?;
        }
        for (index, value) in items.into_iter().enumerate() {
            self.reconcile_slot_at(id, PathSegment::Index(index), value, root)?;
        }
        Ok(())
    }

    fn reconcile_slot_at(
        &self,
        container: NodeId,
        segment: PathSegment,
        value: Value,
        root: NodeId,
    ) -> Result<()> {
        let old = self.raw_child(container, &segment)?;
        let next = self.reconcile_value(
            old.as_ref().unwrap_or(&Value::Null),
            value,
            root,
            (container, &segment),
        )?;
        if old.as_ref().is_some_and(|old| same_slot(old, &next)) {
            return Ok(());
        }
        self.write_slot(container, segment, next, root)
    }

    /// Reconciles a single slot of `container` against `value`.
    pub(crate) fn reconcile_slot(
        &self,
        container: &Node,
        segment: PathSegment,
        value: Value,
    ) -> Result<()> {
        let id = self.require(container)?;
        let root = self.root_id(id);
        self.reconcile_slot_at(id, segment, value, root)
    }

    /// Inserts `values` into a list at `index`, resolving keyed data to live
    /// instances and moving them out of their previous slot in the same tree.
    pub(crate) fn insert_reconciled(
        &self,
        container: &Node,
        index: usize,
        values: Vec<Value>,
    ) -> Result<()> {
        let id = self.require(container)?;
        let root = self.root_id(id);
        let mut resolved = Vec::with_capacity(values.len());
        for (offset, value) in values.into_iter().enumerate() {
            let segment = PathSegment::Index(index + offset);
            let next = self.reconcile_value(&Value::Null, value, root, (id, &segment))?;
            if let Value::Node(node) = &next {
                self.vacate(node.id(), root)?;
            }
            resolved.push(next);
        }
        self.splice_items(id, index, 0, resolved).map(|_| ())
    }

    /// Writes a reconciled value into a slot, first clearing the old slot of
    /// a node moving within the same tree.
    fn write_slot(
        &self,
        container: NodeId,
        segment: PathSegment,
        next: Value,
        root: NodeId,
    ) -> Result<()> {
        if let Value::Node(node) = &next {
            let child = node.id();
            let elsewhere = self
                .parent_of(child)
                .is_some_and(|(parent, current)| !(parent == container && current == segment));
            if elsewhere {
                self.vacate(child, root)?;
            }
        }
        match segment {
            PathSegment::Key(key) => self.set_key(container, key, next),
            PathSegment::Index(index) => self.set_item(container, index, next),
        }
    }

    /// Empties the slot currently holding `child` if it belongs to `root`'s
    /// tree. Nodes attached in other trees are left alone, so writing them
    /// still fails with the single-parent error.
    fn vacate(&self, child: NodeId, root: NodeId) -> Result<()> {
        let Some((parent, segment)) = self.parent_of(child) else {
            return Ok(());
        };
        if self.root_id(child) != root {
            return Ok(());
        }
        match segment {
            PathSegment::Key(key) => self.set_key(parent, key, Value::Null),
            PathSegment::Index(index) => self.set_item(parent, index, Value::Null),
        }
    }
}

fn same_slot(old: &Value, new: &Value) -> bool {
    match (old, new) {
        (Value::Node(a), Value::Node(b)) => a == b,
        (Value::Node(_), _) | (_, Value::Node(_)) => false,
        (a, b) => a.is_primitive() && b.is_primitive() && a == b,
    }
}
