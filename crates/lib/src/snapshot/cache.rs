//! Per-node snapshot caching and snapshot subscriptions.

use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};

use tracing::warn;

use super::Snapshot;
use crate::{
    Forest, Result, WeakForest,
    disposer::Disposer,
    node::{
        Node, NodeError,
        arena::{Arena, Child, Content, NodeId},
    },
    value::Value,
};

/// What [`Forest::on_snapshot`] watches.
#[derive(Clone)]
pub enum SnapshotTarget {
    /// A fixed node
    Node(Node),
    /// A producer re-evaluated reactively; the node it returns may change
    Producer(Rc<dyn Fn() -> Option<Node>>),
}

impl SnapshotTarget {
    pub fn producer(producer: impl Fn() -> Option<Node> + 'static) -> Self {
        SnapshotTarget::Producer(Rc::new(producer))
    }

    fn resolve(&self) -> Option<Node> {
        match self {
            SnapshotTarget::Node(node) => Some(node.clone()),
            SnapshotTarget::Producer(producer) => producer(),
        }
    }
}

impl From<Node> for SnapshotTarget {
    fn from(node: Node) -> Self {
        SnapshotTarget::Node(node)
    }
}

impl From<&Node> for SnapshotTarget {
    fn from(node: &Node) -> Self {
        SnapshotTarget::Node(node.clone())
    }
}

impl fmt::Debug for SnapshotTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotTarget::Node(node) => f.debug_tuple("Node").field(node).finish(),
            SnapshotTarget::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

impl Forest {
    /// Returns the node's snapshot, reusing the cached one when nothing in
    /// the subtree changed. Reading a snapshot is a reactive read.
    pub fn snapshot(&self, node: &Node) -> Result<Snapshot> {
        let id = self.require(node)?;
        let atom = self.with_node(id, |data| data.snapshot_atom)?;
        self.inner.runtime.report_observed(atom);
        let mut arena = self.inner.arena.borrow_mut();
        compute(&mut arena, id)
    }

    /// Snapshot of an arbitrary value: nodes through their cache, plain
    /// data converted directly.
    pub(crate) fn value_snapshot(&self, value: &Value) -> Result<Snapshot> {
        Ok(match value {
            Value::Node(node) => self.snapshot(node)?,
            Value::List(items) => Snapshot::List(Rc::new(
                items
                    .iter()
                    .map(|item| self.value_snapshot(item))
                    .collect::<Result<_>>()?,
            )),
            Value::Object(map) => Snapshot::Object(Rc::new(
                map.iter()
                    .map(|(key, item)| Ok((key.clone(), self.value_snapshot(item)?)))
                    .collect::<Result<_>>()?,
            )),
            primitive => match primitive.clone().into_primitive() {
                Ok(primitive) => Snapshot::Primitive(primitive),
                Err(_) => return Err(NodeError::NotANode.into()),
            },
        })
    }

    /// Drops cached snapshots from `id` up to its root and notifies
    /// snapshot observers along the way.
    pub(crate) fn invalidate_snapshots(&self, id: NodeId) {
        let mut atoms = Vec::new();
        {
            let mut arena = self.inner.arena.borrow_mut();
            let mut current = Some(id);
            while let Some(node) = current {
                let Some(data) = arena.get_mut(node) else {
                    break;
                };
                data.snapshot = None;
                atoms.push(data.snapshot_atom);
                current = data.parent.as_ref().map(|(parent, _)| *parent);
            }
        }
        for atom in atoms {
            self.inner.runtime.report_changed(atom);
        }
    }

    /// Calls `listener(new, previous)` after each settled batch in which the
    /// target's snapshot changed.
    ///
    /// The listener is not called for the initial snapshot. With a producer
    /// target, switching to a different node also counts as a change.
    pub fn on_snapshot(
        &self,
        target: impl Into<SnapshotTarget>,
        listener: impl Fn(&Snapshot, &Snapshot) + 'static,
    ) -> Result<Disposer> {
        let target = target.into();
        let weak: WeakForest = self.downgrade();
        let previous: RefCell<Option<Snapshot>> = RefCell::new(None);
        self.autorun(move || {
            let Some(forest) = weak.upgrade() else {
                return;
            };
            let Some(node) = target.resolve() else {
                return;
            };
            let current = match forest.snapshot(&node) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(error = %err, "snapshot listener target is not a live node");
                    return;
                }
            };
            let prior = previous.borrow_mut().replace(current.clone());
            if let Some(prior) = prior {
                if !prior.ptr_eq(&current) {
                    forest.untracked(|| listener(&current, &prior));
                }
            }
        })
    }
}

fn compute(arena: &mut Arena, id: NodeId) -> Result<Snapshot> {
    let data = arena.get(id).ok_or(NodeError::NotANode)?;
    if let Some(cached) = &data.snapshot {
        return Ok(cached.clone());
    }
    let content = data.content.clone();
    let snapshot = match content {
        Content::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for child in &items {
                out.push(compute_child(arena, child)?);
            }
            Snapshot::List(Rc::new(out))
        }
        Content::Object(map) => {
            let mut out = BTreeMap::new();
            for (key, child) in &map {
                out.insert(key.clone(), compute_child(arena, child)?);
            }
            Snapshot::Object(Rc::new(out))
        }
    };
    if let Some(data) = arena.get_mut(id) {
        data.snapshot = Some(snapshot.clone());
    }
    Ok(snapshot)
}

fn compute_child(arena: &mut Arena, child: &Child) -> Result<Snapshot> {
    match child {
        Child::Prim(primitive) => Ok(Snapshot::Primitive(primitive.clone())),
        Child::Node(id) => compute(arena, *id),
    }
}
