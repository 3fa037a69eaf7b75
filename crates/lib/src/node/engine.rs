//! Node construction, structural mutation and change delivery.
//!
//! Every mutation follows the same sequence inside a batch:
//!
//! 1. validate the target and attach incoming children (so a failed attach
//!    leaves the node untouched),
//! 2. write the new content,
//! 3. detach replaced or removed children,
//! 4. invalidate cached snapshots from the node up to its root and notify
//!    content observers,
//! 5. deliver a [`ChangeEvent`] to listeners on the node and its ancestors,
//! 6. run init hooks of typed nodes created by the write.

use std::{collections::BTreeMap, rc::Rc};

use tracing::trace;

use super::{
    Change, ChangeEvent, Node, NodeError,
    arena::{Child, Content, Listener, NodeId},
};
use crate::{Forest, Result, disposer::Disposer, path::PathSegment, value::Value};

impl Forest {
    // ===== CONSTRUCTION =====

    /// Wraps plain data into an observable tree and returns its root.
    ///
    /// Wrapping is idempotent: passing a [`Value::Node`] returns that node.
    /// Objects carrying the type tag and key of a live keyed instance
    /// resolve to that instance, which is reconciled with the given data.
    ///
    /// Fails with [`NodeError::NotAContainer`] for primitives.
    pub fn wrap(&self, value: impl Into<Value>) -> Result<Node> {
        self.wrap_value(value.into(), true)
    }

    /// Wraps without running init hooks; the caller runs them later through
    /// [`Forest::initialize`].
    pub(crate) fn wrap_value(&self, value: Value, run_init: bool) -> Result<Node> {
        if let Value::Node(node) = value {
            self.require(&node)?;
            return Ok(node);
        }
        if value.is_primitive() {
            return Err(NodeError::NotAContainer {
                kind: value.type_name(),
            }
            .into());
        }
        self.action(|| {
            let mut created = Vec::new();
            let id = self.build(value, None, &mut created)?;
            let node = self.handle_or_err(id)?;
            trace!(node = %id, created = created.len(), "wrapped value");
            if run_init {
                self.run_init_hooks(&created)?;
            }
            Ok(node)
        })
    }

    /// Builds nodes for `value` bottom-up, appending typed nodes that need
    /// initialization to `created` in children-first order.
    ///
    /// `slot` is where the result will be attached. Keyed data naming a live
    /// instance is merged into it only if that instance can take the slot,
    /// so a doomed attach never mutates a node in another tree.
    pub(crate) fn build(
        &self,
        value: Value,
        slot: Option<(NodeId, &PathSegment)>,
        created: &mut Vec<NodeId>,
    ) -> Result<NodeId> {
        match value {
            Value::Node(node) => self.require(&node),
            Value::List(items) => {
                let id = self.alloc(Content::List(Vec::with_capacity(items.len())));
                for (index, item) in items.into_iter().enumerate() {
                    let child = self.attach_value(id, PathSegment::Index(index), item, created)?;
                    self.with_node_mut(id, move |data| {
                        if let Content::List(list) = &mut data.content {
                            list.push(child);
                        }
                    })?;
                }
                Ok(id)
            }
            Value::Object(map) => {
                if let Some(existing) = self.live_keyed_instance(&map) {
                    self.ensure_claimable(existing, slot, None)?;
                    let root = self.root_id(existing);
                    self.merge_object(existing, map, root)?;
                    return Ok(existing);
                }
                let identity = self.keyed_identity(&map);
                let id = self.alloc(Content::Object(BTreeMap::new()));
                for (key, item) in map {
                    let child =
                        self.attach_value(id, PathSegment::Key(key.clone()), item, created)?;
                    self.with_node_mut(id, move |data| {
                        if let Content::Object(object) = &mut data.content {
                            object.insert(key, child);
                        }
                    })?;
                }
                if let Some((tag, key)) = identity {
                    self.inner
                        .types
                        .borrow_mut()
                        .register_instance(tag, key, id);
                }
                if self.type_def_of(id).is_some() {
                    created.push(id);
                }
                Ok(id)
            }
            primitive => Err(NodeError::NotAContainer {
                kind: primitive.type_name(),
            }
            .into()),
        }
    }

    fn attach_value(
        &self,
        parent: NodeId,
        segment: PathSegment,
        value: Value,
        created: &mut Vec<NodeId>,
    ) -> Result<Child> {
        let container = match value.into_primitive() {
            Ok(primitive) => return Ok(Child::Prim(primitive)),
            Err(container) => container,
        };
        let id = self.build(container, Some((parent, &segment)), created)?;
        self.attach(id, parent, segment)?;
        Ok(Child::Node(id))
    }

    /// Fails unless `existing` could be attached at `slot`.
    ///
    /// A node may take the slot when it is detached or already there. With
    /// `movable_within` set, a node elsewhere in that tree is accepted too,
    /// since the caller moves it out of its old slot first. A missing `slot`
    /// accepts anything.
    pub(crate) fn ensure_claimable(
        &self,
        existing: NodeId,
        slot: Option<(NodeId, &PathSegment)>,
        movable_within: Option<NodeId>,
    ) -> Result<()> {
        let Some((parent, segment)) = slot else {
            return Ok(());
        };
        if existing == parent || self.is_ancestor_of(existing, parent) {
            return Err(NodeError::Cycle {
                path: self.location_string(parent, segment),
            }
            .into());
        }
        let Some((current_parent, current_segment)) = self.parent_of(existing) else {
            return Ok(());
        };
        if current_parent == parent && current_segment == *segment {
            return Ok(());
        }
        if movable_within.is_some_and(|root| self.root_id(existing) == root) {
            return Ok(());
        }
        Err(NodeError::AlreadyAttached {
            attempted: self.location_string(parent, segment),
            existing: self.location_string(current_parent, &current_segment),
        }
        .into())
    }

    // ===== PARENTAGE =====

    pub(crate) fn attach(&self, child: NodeId, parent: NodeId, segment: PathSegment) -> Result<()> {
        let current = self.with_node(child, |data| data.parent.clone())?;
        if let Some((current_parent, current_segment)) = current {
            if current_parent == parent && current_segment == segment {
                return Ok(());
            }
            return Err(NodeError::AlreadyAttached {
                attempted: self.location_string(parent, &segment),
                existing: self.location_string(current_parent, &current_segment),
            }
            .into());
        }
        if child == parent || self.is_ancestor_of(child, parent) {
            return Err(NodeError::Cycle {
                path: self.location_string(parent, &segment),
            }
            .into());
        }
        trace!(node = %child, parent = %parent, %segment, "attaching node");
        let atom = self.with_node_mut(child, |data| {
            data.parent = Some((parent, segment));
            data.parent_atom
        })?;
        if let Some(atom) = atom {
            self.inner.runtime.report_changed(atom);
        }
        Ok(())
    }

    pub(crate) fn detach(&self, child: NodeId) {
        let Ok(atom) = self.with_node_mut(child, |data| {
            data.parent = None;
            data.parent_atom
        }) else {
            return;
        };
        trace!(node = %child, "detached node");
        self.release_memos(child);
        self.mark_orphan(child);
        if let Some(atom) = atom {
            self.inner.runtime.report_changed(atom);
        }
    }

    /// Empties memoized computeds across a detached subtree. A cached value
    /// may hold handles into the subtree, which would otherwise pin it
    /// against collection.
    fn release_memos(&self, root: NodeId) {
        let subtree = self.inner.arena.borrow().subtree(root);
        let cells: Vec<_> = subtree
            .into_iter()
            .filter_map(|id| {
                self.with_node(id, |data| data.computeds.values().cloned().collect::<Vec<_>>())
                    .ok()
            })
            .flatten()
            .collect();
        for cell in cells {
            cell.release();
        }
    }

    fn reindex(&self, child: NodeId, index: usize) {
        let atom = self.with_node_mut(child, |data| match &mut data.parent {
            Some((_, segment)) if *segment != PathSegment::Index(index) => {
                *segment = PathSegment::Index(index);
                data.parent_atom
            }
            _ => None,
        });
        if let Ok(Some(atom)) = atom {
            self.inner.runtime.report_changed(atom);
        }
    }

    // ===== MUTATION =====

    fn ensure_mutable(&self) -> Result<()> {
        if self.inner.config.borrow().enforce_actions() && !self.inner.runtime.in_action() {
            return Err(NodeError::OutsideAction.into());
        }
        Ok(())
    }

    fn object_child(&self, id: NodeId, key: &str) -> Result<Option<Child>> {
        Ok(self.with_node(id, |data| match &data.content {
            Content::Object(map) => Ok(map.get(key).cloned()),
            other => Err(NodeError::WrongKind {
                expected: "object",
                actual: other.kind_name(),
            }),
        })??)
    }

    pub(crate) fn list_len_of(&self, id: NodeId) -> Result<usize> {
        Ok(self.with_node(id, |data| match &data.content {
            Content::List(items) => Ok(items.len()),
            other => Err(NodeError::WrongKind {
                expected: "list",
                actual: other.kind_name(),
            }),
        })??)
    }

    pub(crate) fn set_key(&self, id: NodeId, key: String, value: Value) -> Result<()> {
        self.ensure_mutable()?;
        let old = self.object_child(id, &key)?;
        if old.as_ref().is_some_and(|old| old.matches(&value)) {
            return Ok(());
        }
        self.check_identity_write(id, &key, Some(&value))?;
        self.batch(|| {
            let mut created = Vec::new();
            let child = self.attach_value(id, PathSegment::Key(key.clone()), value, &mut created)?;
            if old.as_ref() == Some(&child) {
                return self.run_init_hooks(&created);
            }
            let stored = child.clone();
            let slot = key.clone();
            self.with_node_mut(id, move |data| {
                if let Content::Object(map) = &mut data.content {
                    map.insert(slot, stored);
                }
            })?;
            if let Some(old_id) = old.as_ref().and_then(Child::node) {
                self.detach(old_id);
            }
            let new = self.child_value(&child);
            let change = match old {
                None => Change::Add { key, value: new },
                Some(old) => Change::Update {
                    key,
                    old: self.child_value(&old),
                    new,
                },
            };
            self.after_change(id, change)?;
            self.run_init_hooks(&created)
        })
    }

    pub(crate) fn remove_key(&self, id: NodeId, key: &str) -> Result<Option<Value>> {
        self.ensure_mutable()?;
        let Some(old) = self.object_child(id, key)? else {
            return Ok(None);
        };
        self.check_identity_write(id, key, None)?;
        self.batch(|| {
            self.with_node_mut(id, |data| {
                if let Content::Object(map) = &mut data.content {
                    map.remove(key);
                }
            })?;
            if let Some(old_id) = old.node() {
                self.detach(old_id);
            }
            let old = self.child_value(&old);
            self.after_change(
                id,
                Change::Remove {
                    key: key.to_string(),
                    old: old.clone(),
                },
            )?;
            Ok(Some(old))
        })
    }

    pub(crate) fn set_item(&self, id: NodeId, index: usize, value: Value) -> Result<()> {
        self.ensure_mutable()?;
        let len = self.list_len_of(id)?;
        if index == len {
            return self.splice_items(id, len, 0, vec![value]).map(|_| ());
        }
        let old = self
            .with_node(id, |data| match &data.content {
                Content::List(items) => items.get(index).cloned(),
                Content::Object(_) => None,
            })?
            .ok_or(NodeError::IndexOutOfBounds { index, len })?;
        if old.matches(&value) {
            return Ok(());
        }
        self.batch(|| {
            let mut created = Vec::new();
            let child = self.attach_value(id, PathSegment::Index(index), value, &mut created)?;
            if child == old {
                return self.run_init_hooks(&created);
            }
            let stored = child.clone();
            self.with_node_mut(id, move |data| {
                if let Content::List(items) = &mut data.content {
                    if let Some(slot) = items.get_mut(index) {
                        *slot = stored;
                    }
                }
            })?;
            if let Some(old_id) = old.node() {
                self.detach(old_id);
            }
            let change = Change::ListUpdate {
                index,
                old: self.child_value(&old),
                new: self.child_value(&child),
            };
            self.after_change(id, change)?;
            self.run_init_hooks(&created)
        })
    }

    /// Removes `delete_count` elements at `start` and inserts `items` there.
    ///
    /// `start` and `delete_count` are clamped to the list. If any inserted
    /// item cannot be attached, the list is left unchanged.
    pub(crate) fn splice_items(
        &self,
        id: NodeId,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>> {
        self.ensure_mutable()?;
        let len = self.list_len_of(id)?;
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);
        if delete_count == 0 && items.is_empty() {
            return Ok(Vec::new());
        }
        self.batch(|| {
            let removed: Vec<Child> = self.with_node(id, |data| match &data.content {
                Content::List(list) => list[start..start + delete_count].to_vec(),
                Content::Object(_) => Vec::new(),
            })?;
            for node in removed.iter().filter_map(Child::node) {
                self.detach(node);
            }

            let mut created = Vec::new();
            let mut added = Vec::with_capacity(items.len());
            for (offset, item) in items.into_iter().enumerate() {
                match self.attach_value(id, PathSegment::Index(start + offset), item, &mut created) {
                    Ok(child) => added.push(child),
                    Err(err) => {
                        for node in added.iter().filter_map(Child::node) {
                            self.detach(node);
                        }
                        for (offset, child) in removed.iter().enumerate() {
                            if let Some(node) = child.node() {
                                self.attach(node, id, PathSegment::Index(start + offset))?;
                            }
                        }
                        return Err(err);
                    }
                }
            }

            let added_len = added.len();
            let stored = added.clone();
            self.with_node_mut(id, move |data| {
                if let Content::List(list) = &mut data.content {
                    let _replaced: Vec<Child> =
                        list.splice(start..start + delete_count, stored).collect();
                }
            })?;
            if added_len != delete_count {
                let trailing: Vec<(usize, NodeId)> = self.with_node(id, |data| match &data.content {
                    Content::List(list) => list
                        .iter()
                        .enumerate()
                        .skip(start + added_len)
                        .filter_map(|(index, child)| Some((index, child.node()?)))
                        .collect(),
                    Content::Object(_) => Vec::new(),
                })?;
                for (index, node) in trailing {
                    self.reindex(node, index);
                }
            }

            let removed: Vec<Value> = removed.iter().map(|child| self.child_value(child)).collect();
            let added: Vec<Value> = added.iter().map(|child| self.child_value(child)).collect();
            self.after_change(
                id,
                Change::Splice {
                    index: start,
                    removed: removed.clone(),
                    added,
                },
            )?;
            self.run_init_hooks(&created)?;
            Ok(removed)
        })
    }

    /// Sets an object property. Writing a value identical to the current one
    /// is a no-op and emits nothing.
    pub fn set(&self, node: &Node, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let id = self.require(node)?;
        self.set_key(id, key.into(), value.into())
    }

    /// Deletes an object property, returning its previous value.
    pub fn remove(&self, node: &Node, key: &str) -> Result<Option<Value>> {
        let id = self.require(node)?;
        self.remove_key(id, key)
    }

    /// Replaces a list element; `index == len` appends.
    pub fn set_index(&self, node: &Node, index: usize, value: impl Into<Value>) -> Result<()> {
        let id = self.require(node)?;
        self.set_item(id, index, value.into())
    }

    pub fn push(&self, node: &Node, value: impl Into<Value>) -> Result<()> {
        let id = self.require(node)?;
        let len = self.list_len_of(id)?;
        self.splice_items(id, len, 0, vec![value.into()]).map(|_| ())
    }

    pub fn insert(&self, node: &Node, index: usize, value: impl Into<Value>) -> Result<()> {
        let id = self.require(node)?;
        let len = self.list_len_of(id)?;
        if index > len {
            return Err(NodeError::IndexOutOfBounds { index, len }.into());
        }
        self.splice_items(id, index, 0, vec![value.into()]).map(|_| ())
    }

    pub fn pop(&self, node: &Node) -> Result<Option<Value>> {
        let id = self.require(node)?;
        let len = self.list_len_of(id)?;
        if len == 0 {
            return Ok(None);
        }
        Ok(self.splice_items(id, len - 1, 1, Vec::new())?.pop())
    }

    pub fn remove_at(&self, node: &Node, index: usize) -> Result<Value> {
        let id = self.require(node)?;
        let len = self.list_len_of(id)?;
        if index >= len {
            return Err(NodeError::IndexOutOfBounds { index, len }.into());
        }
        self.splice_items(id, index, 1, Vec::new())?
            .pop()
            .ok_or_else(|| NodeError::IndexOutOfBounds { index, len }.into())
    }

    /// Array-style splice, returning the removed elements.
    pub fn splice(
        &self,
        node: &Node,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let id = self.require(node)?;
        self.splice_items(id, start, delete_count, items)
    }

    // ===== READS =====

    pub(crate) fn child_value(&self, child: &Child) -> Value {
        match child {
            Child::Prim(primitive) => Value::from(primitive.clone()),
            Child::Node(id) => self.handle(*id).map(Value::Node).unwrap_or(Value::Null),
        }
    }

    /// Reads a node's content without reporting the read to observers.
    pub(crate) fn raw_child(&self, id: NodeId, segment: &PathSegment) -> Result<Option<Value>> {
        let child = self.with_node(id, |data| data.content.child(segment).cloned())?;
        Ok(child.map(|child| self.child_value(&child)))
    }

    /// Runs `read` on the node's content and reports the read.
    fn observe<R>(&self, node: &Node, read: impl FnOnce(&Content) -> R) -> Option<R> {
        let id = self.require(node).ok()?;
        let (atom, result) = self
            .with_node(id, |data| (data.content_atom, read(&data.content)))
            .ok()?;
        self.inner.runtime.report_observed(atom);
        Some(result)
    }

    pub fn get(&self, node: &Node, key: &str) -> Option<Value> {
        let child = self.observe(node, |content| match content {
            Content::Object(map) => map.get(key).cloned(),
            Content::List(_) => None,
        })??;
        Some(self.child_value(&child))
    }

    pub fn at(&self, node: &Node, index: usize) -> Option<Value> {
        let child = self.observe(node, |content| match content {
            Content::List(items) => items.get(index).cloned(),
            Content::Object(_) => None,
        })??;
        Some(self.child_value(&child))
    }

    pub fn len(&self, node: &Node) -> usize {
        self.observe(node, |content| match content {
            Content::List(items) => items.len(),
            Content::Object(map) => map.len(),
        })
        .unwrap_or(0)
    }

    /// Object property names in key order; empty for lists.
    pub fn keys(&self, node: &Node) -> Vec<String> {
        self.observe(node, |content| match content {
            Content::Object(map) => map.keys().cloned().collect(),
            Content::List(_) => Vec::new(),
        })
        .unwrap_or_default()
    }

    /// List elements, or object values in key order.
    pub fn items(&self, node: &Node) -> Vec<Value> {
        let children: Vec<Child> = self
            .observe(node, |content| match content {
                Content::List(items) => items.clone(),
                Content::Object(map) => map.values().cloned().collect(),
            })
            .unwrap_or_default();
        children.iter().map(|child| self.child_value(child)).collect()
    }

    pub fn entries(&self, node: &Node) -> Vec<(String, Value)> {
        let children: Vec<(String, Child)> = self
            .observe(node, |content| match content {
                Content::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                Content::List(_) => Vec::new(),
            })
            .unwrap_or_default();
        children
            .into_iter()
            .map(|(key, child)| (key, self.child_value(&child)))
            .collect()
    }

    pub fn is_list(&self, node: &Node) -> bool {
        self.require(node)
            .and_then(|id| self.with_node(id, |data| data.content.is_list()))
            .unwrap_or(false)
    }

    pub fn is_object(&self, node: &Node) -> bool {
        self.require(node)
            .and_then(|id| self.with_node(id, |data| !data.content.is_list()))
            .unwrap_or(false)
    }

    // ===== CHANGE DELIVERY =====

    fn after_change(&self, id: NodeId, change: Change) -> Result<()> {
        self.invalidate_snapshots(id);
        let atom = self.with_node(id, |data| data.content_atom)?;
        self.inner.runtime.report_changed(atom);
        self.emit(id, change);
        Ok(())
    }

    /// Delivers a change to the node's own listeners, then to each ancestor's.
    fn emit(&self, id: NodeId, change: Change) {
        let mut callbacks = Vec::new();
        {
            let arena = self.inner.arena.borrow();
            let mut current = Some(id);
            while let Some(node) = current {
                let Some(data) = arena.get(node) else {
                    break;
                };
                callbacks.extend(data.listeners.iter().map(|listener| listener.callback.clone()));
                current = data.parent.as_ref().map(|(parent, _)| *parent);
            }
        }
        if callbacks.is_empty() {
            return;
        }
        let Some(target) = self.handle(id) else {
            return;
        };
        let event = ChangeEvent { target, change };
        trace!(node = %id, change = %event.change.kind(), listeners = callbacks.len(), "emitting change");
        for callback in callbacks {
            callback(&event);
        }
    }

    /// Subscribes to every structural change of `node` and its descendants.
    pub fn on_deep_change(
        &self,
        node: &Node,
        listener: impl Fn(&ChangeEvent) + 'static,
    ) -> Result<Disposer> {
        let id = self.require(node)?;
        let listener_id = self.next_listener_id();
        self.with_node_mut(id, |data| {
            data.listeners.push(Listener {
                id: listener_id,
                callback: Rc::new(listener),
            })
        })?;
        let weak = self.downgrade();
        Ok(Disposer::new(move || {
            if let Some(forest) = weak.upgrade() {
                let _ = forest.with_node_mut(id, |data| {
                    data.listeners.retain(|listener| listener.id != listener_id)
                });
            }
        }))
    }
}
