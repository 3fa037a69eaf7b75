//! Generational storage for node data.
//!
//! Nodes live in a slab indexed by [`NodeId`]. Freeing a slot bumps its
//! generation, so ids held by stale handles or registries stop resolving
//! instead of aliasing whatever node reuses the slot.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    rc::{Rc, Weak},
};

use crate::{
    node::ChangeEvent,
    path::PathSegment,
    reactive::{AtomId, Computed},
    snapshot::Snapshot,
    types::BoundAction,
    value::{InstanceKey, Primitive, Value},
};

/// Identity of a node within its forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// A slot value: a primitive leaf or a child node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Child {
    Prim(Primitive),
    Node(NodeId),
}

impl Child {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Child::Node(id) => Some(*id),
            Child::Prim(_) => None,
        }
    }

    pub fn instance_key(&self) -> Option<InstanceKey> {
        match self {
            Child::Prim(primitive) => primitive.instance_key(),
            Child::Node(_) => None,
        }
    }

    /// True when writing `value` into this slot would change nothing.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Child::Node(id), Value::Node(node)) => node.id() == *id,
            (Child::Prim(Primitive::Null), Value::Null) => true,
            (Child::Prim(Primitive::Bool(a)), Value::Bool(b)) => a == b,
            (Child::Prim(Primitive::Int(a)), Value::Int(b)) => a == b,
            (Child::Prim(Primitive::Float(a)), Value::Float(b)) => a == b,
            (Child::Prim(Primitive::Text(a)), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Content {
    Object(BTreeMap<String, Child>),
    List(Vec<Child>),
}

impl Content {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Content::Object(_) => "object",
            Content::List(_) => "list",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Content::List(_))
    }

    pub fn child(&self, segment: &PathSegment) -> Option<&Child> {
        match (self, segment) {
            (Content::Object(map), PathSegment::Key(key)) => map.get(key),
            (Content::List(items), PathSegment::Index(index)) => items.get(*index),
            _ => None,
        }
    }

    /// Node children with the segment each sits under, in content order.
    pub fn node_children(&self) -> Vec<(PathSegment, NodeId)> {
        match self {
            Content::Object(map) => map
                .iter()
                .filter_map(|(key, child)| Some((PathSegment::Key(key.clone()), child.node()?)))
                .collect(),
            Content::List(items) => items
                .iter()
                .enumerate()
                .filter_map(|(index, child)| Some((PathSegment::Index(index), child.node()?)))
                .collect(),
        }
    }
}

pub(crate) struct Listener {
    pub id: u64,
    pub callback: Rc<dyn Fn(&ChangeEvent)>,
}

pub(crate) struct VolatileSlot {
    pub value: Option<Value>,
    pub atom: AtomId,
}

/// Everything the forest knows about one node.
pub(crate) struct NodeData {
    pub content: Content,
    pub parent: Option<(NodeId, PathSegment)>,
    /// Changes on any structural write to this node
    pub content_atom: AtomId,
    /// Changes whenever the cached snapshot is invalidated
    pub snapshot_atom: AtomId,
    /// Created on first parent query
    pub parent_atom: Option<AtomId>,
    pub snapshot: Option<Snapshot>,
    pub listeners: Vec<Listener>,
    /// Alive while any [`Node`](crate::Node) handle to this node exists
    pub pin: Weak<()>,
    pub initialized: bool,
    pub bound_actions: HashMap<String, BoundAction>,
    pub computeds: HashMap<String, Rc<Computed<Value>>>,
    pub volatile: HashMap<String, VolatileSlot>,
}

impl NodeData {
    pub fn new(content: Content, content_atom: AtomId, snapshot_atom: AtomId) -> Self {
        Self {
            content,
            parent: None,
            content_atom,
            snapshot_atom,
            parent_atom: None,
            snapshot: None,
            listeners: Vec::new(),
            pin: Weak::new(),
            initialized: false,
            bound_actions: HashMap::new(),
            computeds: HashMap::new(),
            volatile: HashMap::new(),
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pin.strong_count() > 0
    }

    /// Every atom owned by this node.
    pub fn atoms(&self) -> Vec<AtomId> {
        let mut atoms = vec![self.content_atom, self.snapshot_atom];
        atoms.extend(self.parent_atom);
        atoms.extend(self.volatile.values().map(|slot| slot.atom));
        atoms
    }
}

struct Entry {
    generation: u32,
    data: Option<NodeData>,
}

#[derive(Default)]
pub(crate) struct Arena {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl Arena {
    pub fn insert(&mut self, data: NodeData) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.data = Some(data);
            return NodeId {
                index,
                generation: entry.generation,
            };
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            data: Some(data),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        let entry = self.entries.get(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.data.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.data.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: NodeId) -> Option<NodeData> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        let data = entry.data.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(data)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    /// Ids of every live node.
    pub fn ids(&self) -> Vec<NodeId> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.data.is_some())
            .map(|(index, entry)| NodeId {
                index: index as u32,
                generation: entry.generation,
            })
            .collect()
    }

    /// The node and all of its descendants, parents before children.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(data) = self.get(id) else {
                continue;
            };
            out.push(id);
            let children = data.content.node_children();
            stack.extend(children.into_iter().rev().map(|(_, child)| child));
        }
        out
    }
}
