//! Typed nodes: the type registry and the node factory.
//!
//! A node type is declared with a [`NodeTypeBuilder`] and registered on a
//! forest, yielding a [`NodeType`]. Instances are ordinary object nodes whose
//! `$$type` property holds the type tag; keyed types additionally carry a
//! uniqueness key, and at most one live instance exists per `(tag, key)`.
//!
//! Wrapping plain data that carries the tag and key of a live instance
//! resolves to that instance (and reconciles it) instead of creating a
//! second node. This is what lets reconciliation keep node identity across
//! reorders.

mod builder;
mod errors;
pub(crate) mod registry;

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fmt,
    rc::Rc,
};

use tracing::{debug, trace};

pub use builder::{ComputedOptions, NodeTypeBuilder};
pub use errors::TypeError;

use crate::{
    Forest, Result,
    constants::TYPE_PROP,
    disposer::Disposer,
    node::{
        Node, NodeError, NodeId,
        arena::{Child, Content, VolatileSlot},
    },
    reactive::Computed,
    value::{InstanceKey, Value},
};

pub type ActionFn = Rc<dyn Fn(&Node, &[Value]) -> Result<Value>>;
pub type GetterFn = Rc<dyn Fn(&Node, &[Value]) -> Value>;
pub type ComputedFn = Rc<dyn Fn(&Node) -> Value>;
pub type DefaultFn = Rc<dyn Fn() -> Value>;
pub type InitHook = Rc<dyn Fn(&Node) -> Result<()>>;
pub type ValueEquals = Rc<dyn Fn(&Value, &Value) -> bool>;

/// An action bound to one node; the same `Rc` is returned on every lookup.
pub type BoundAction = Rc<dyn Fn(&[Value]) -> Result<Value>>;

#[derive(Clone)]
pub(crate) struct ComputedDef {
    pub derive: ComputedFn,
    pub equals: Option<ValueEquals>,
}

pub(crate) struct TypeDef {
    pub tag: String,
    pub key_prop: Option<String>,
    pub defaults: BTreeMap<String, DefaultFn>,
    pub actions: BTreeMap<String, ActionFn>,
    pub getters: BTreeMap<String, GetterFn>,
    pub computeds: BTreeMap<String, ComputedDef>,
    pub volatiles: BTreeMap<String, DefaultFn>,
    pub init_hooks: RefCell<Vec<(u64, InitHook)>>,
    pub next_hook: Cell<u64>,
}

/// Type tag and key of a node, as reported by [`Forest::type_and_key`].
#[derive(Clone)]
pub struct TypeAndKey {
    pub tag: String,
    pub key: Option<InstanceKey>,
    /// The registered type, if the tag is known to this forest
    pub node_type: Option<NodeType>,
}

impl fmt::Debug for TypeAndKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeAndKey")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("registered", &self.node_type.is_some())
            .finish()
    }
}

/// A registered node type, bound to its forest.
#[derive(Clone)]
pub struct NodeType {
    forest: Forest,
    def: Rc<TypeDef>,
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("tag", &self.def.tag)
            .field("key_prop", &self.def.key_prop)
            .finish_non_exhaustive()
    }
}

impl NodeType {
    pub fn tag(&self) -> &str {
        &self.def.tag
    }

    pub fn key_prop(&self) -> Option<&str> {
        self.def.key_prop.as_deref()
    }

    /// Creates an instance from object data.
    ///
    /// Stamps the type tag, fills defaults for absent or null properties,
    /// and generates a key for keyed types when none is given. If the key
    /// belongs to a live instance, that instance is reconciled with the data
    /// and returned.
    pub fn create(&self, data: impl Into<Value>) -> Result<Node> {
        let mut map = match data.into() {
            Value::Object(map) => map,
            other => {
                return Err(TypeError::NotAnObject {
                    tag: self.def.tag.clone(),
                    kind: other.type_name(),
                }
                .into());
            }
        };
        match map.get(TYPE_PROP) {
            None | Some(Value::Null) => {}
            Some(Value::Text(tag)) if *tag == self.def.tag => {}
            Some(other) => {
                return Err(TypeError::TagMismatch {
                    expected: self.def.tag.clone(),
                    actual: other.to_string(),
                }
                .into());
            }
        }
        map.insert(TYPE_PROP.to_string(), Value::Text(self.def.tag.clone()));
        for (prop, default) in &self.def.defaults {
            if map.get(prop).is_none_or(Value::is_null) {
                map.insert(prop.clone(), default());
            }
        }
        if let Some(key_prop) = &self.def.key_prop {
            if map.get(key_prop).is_none_or(Value::is_null) {
                let key = self.forest.config().generate_key();
                map.insert(key_prop.clone(), Value::Text(key));
            }
        }
        trace!(tag = %self.def.tag, "creating typed node");
        self.forest.wrap(Value::Object(map))
    }

    /// Returns true if `node` is an instance of this type.
    pub fn is(&self, node: &Node) -> bool {
        self.forest
            .require(node)
            .ok()
            .and_then(|id| self.forest.node_tag(id))
            .is_some_and(|tag| tag == self.def.tag)
    }

    fn check(&self, node: &Node) -> Result<NodeId> {
        let id = self.forest.require(node)?;
        if self.forest.node_tag(id).as_deref() != Some(self.def.tag.as_str()) {
            return Err(TypeError::NotAnInstance {
                tag: self.def.tag.clone(),
            }
            .into());
        }
        Ok(id)
    }

    fn unknown(&self, kind: &'static str, name: &str) -> crate::Error {
        TypeError::UnknownMember {
            tag: self.def.tag.clone(),
            kind,
            name: name.to_string(),
        }
        .into()
    }

    pub fn key_of(&self, node: &Node) -> Option<InstanceKey> {
        let key_prop = self.def.key_prop.as_deref()?;
        node.get(key_prop)?.instance_key()
    }

    /// The live instance with `key`, if any. Text and integer keys are
    /// distinct: `find_by_key("1")` never finds the instance keyed `1`.
    pub fn find_by_key(&self, key: impl Into<InstanceKey>) -> Option<Node> {
        let id = self
            .forest
            .inner
            .types
            .borrow()
            .lookup_instance(&self.def.tag, &key.into())?;
        self.forest.handle(id)
    }

    // ===== MEMBERS =====

    /// Invokes an action on `node`. Actions run batched; the call returns
    /// after observers have been notified.
    pub fn call(&self, name: &str, node: &Node, args: &[Value]) -> Result<Value> {
        let bound = self.bound_action(node, name)?;
        bound(args)
    }

    /// The action bound to `node`. Repeated lookups return the same `Rc`.
    pub fn bound_action(&self, node: &Node, name: &str) -> Result<BoundAction> {
        let id = self.check(node)?;
        let action = self
            .def
            .actions
            .get(name)
            .cloned()
            .ok_or_else(|| self.unknown("action", name))?;
        if let Some(bound) = self
            .forest
            .with_node(id, |data| data.bound_actions.get(name).cloned())?
        {
            return Ok(bound);
        }
        let weak = self.forest.downgrade();
        let bound: BoundAction = Rc::new(move |args: &[Value]| {
            let forest = weak.upgrade().ok_or(NodeError::ForestDropped)?;
            let node = forest.handle_or_err(id)?;
            forest.action(|| action(&node, args))
        });
        self.forest.with_node_mut(id, |data| {
            data.bound_actions.insert(name.to_string(), bound.clone())
        })?;
        Ok(bound)
    }

    pub fn get(&self, name: &str, node: &Node, args: &[Value]) -> Result<Value> {
        self.check(node)?;
        let getter = self
            .def
            .getters
            .get(name)
            .ok_or_else(|| self.unknown("getter", name))?;
        Ok(getter(node, args))
    }

    /// Reads a memoized computed member.
    pub fn computed(&self, name: &str, node: &Node) -> Result<Value> {
        let id = self.check(node)?;
        let def = self
            .def
            .computeds
            .get(name)
            .cloned()
            .ok_or_else(|| self.unknown("computed", name))?;
        let cell = match self
            .forest
            .with_node(id, |data| data.computeds.get(name).cloned())?
        {
            Some(cell) => cell,
            None => {
                let cell = Rc::new(Computed::new(
                    self.forest.inner.runtime.clone(),
                    def.equals.clone(),
                ));
                self.forest.with_node_mut(id, |data| {
                    data.computeds.insert(name.to_string(), cell.clone())
                })?;
                cell
            }
        };
        Ok(cell.get_with(|| (def.derive)(node)))
    }

    // ===== VOLATILE STATE =====

    pub fn volatile(&self, name: &str, node: &Node) -> Result<Value> {
        let id = self.check(node)?;
        let default = self
            .def
            .volatiles
            .get(name)
            .cloned()
            .ok_or_else(|| self.unknown("volatile", name))?;
        let (atom, current) = self.volatile_slot(id, name)?;
        self.forest.inner.runtime.report_observed(atom);
        if let Some(value) = current {
            return Ok(value);
        }
        let value = default();
        self.forest.with_node_mut(id, |data| {
            if let Some(slot) = data.volatile.get_mut(name) {
                slot.value = Some(value.clone());
            }
        })?;
        Ok(value)
    }

    pub fn set_volatile(&self, name: &str, node: &Node, value: impl Into<Value>) -> Result<()> {
        self.write_volatile(name, node, Some(value.into()))
    }

    /// Drops the volatile value so the next read re-evaluates the default.
    pub fn reset_volatile(&self, name: &str, node: &Node) -> Result<()> {
        self.write_volatile(name, node, None)
    }

    fn write_volatile(&self, name: &str, node: &Node, value: Option<Value>) -> Result<()> {
        let id = self.check(node)?;
        if !self.def.volatiles.contains_key(name) {
            return Err(self.unknown("volatile", name));
        }
        self.forest.batch(|| {
            let (atom, _) = self.volatile_slot(id, name)?;
            self.forest.with_node_mut(id, |data| {
                if let Some(slot) = data.volatile.get_mut(name) {
                    slot.value = value;
                }
            })?;
            self.forest.inner.runtime.report_changed(atom);
            Ok(())
        })
    }

    fn volatile_slot(&self, id: NodeId, name: &str) -> Result<(crate::reactive::AtomId, Option<Value>)> {
        let runtime = &self.forest.inner.runtime;
        self.forest.with_node_mut(id, |data| {
            let slot = data
                .volatile
                .entry(name.to_string())
                .or_insert_with(|| VolatileSlot {
                    value: None,
                    atom: runtime.create_atom(),
                });
            (slot.atom, slot.value.clone())
        })
    }

    // ===== HOOKS =====

    /// Registers an init hook for instances created from now on.
    pub fn on_init(&self, hook: impl Fn(&Node) -> Result<()> + 'static) -> Disposer {
        let id = self.def.next_hook.get();
        self.def.next_hook.set(id + 1);
        self.def.init_hooks.borrow_mut().push((id, Rc::new(hook)));
        let def = Rc::downgrade(&self.def);
        Disposer::new(move || {
            if let Some(def) = def.upgrade() {
                def.init_hooks.borrow_mut().retain(|(hook_id, _)| *hook_id != id);
            }
        })
    }
}

impl Forest {
    /// Registers a node type. Fails on a duplicate tag or on any error the
    /// builder recorded.
    pub fn register_type(&self, builder: NodeTypeBuilder) -> Result<NodeType> {
        let def = Rc::new(builder.build()?);
        self.inner.types.borrow_mut().register(def.clone())?;
        debug!(tag = %def.tag, keyed = def.key_prop.is_some(), "registered node type");
        Ok(NodeType {
            forest: self.clone(),
            def,
        })
    }

    /// Looks up a registered type by tag.
    pub fn node_type(&self, tag: &str) -> Option<NodeType> {
        let def = self.inner.types.borrow().get(tag)?;
        Some(NodeType {
            forest: self.clone(),
            def,
        })
    }

    /// Number of live keyed instances in the registry.
    pub fn keyed_instance_count(&self) -> usize {
        self.inner.types.borrow().instance_count()
    }

    /// Type tag and key of `value`, if it is a typed node.
    pub fn type_and_key(&self, value: &Value) -> Option<TypeAndKey> {
        let id = self.require(value.as_node()?).ok()?;
        let tag = self.node_tag(id)?;
        let node_type = self.node_type(&tag);
        let key = node_type
            .as_ref()
            .and_then(|node_type| node_type.def.key_prop.clone())
            .and_then(|key_prop| {
                self.with_node(id, |data| {
                    data.content
                        .child(&crate::path::PathSegment::Key(key_prop))
                        .and_then(Child::instance_key)
                })
                .ok()
                .flatten()
            });
        Some(TypeAndKey {
            tag,
            key,
            node_type,
        })
    }

    /// Runs init hooks for the subtree under `node`, children first. Nodes
    /// already initialized are skipped.
    pub fn initialize(&self, node: &Node) -> Result<()> {
        let id = self.require(node)?;
        let mut order = self.inner.arena.borrow().subtree(id);
        order.reverse();
        self.action(|| self.run_init_hooks(&order))
    }

    // ===== IDENTITY HELPERS =====

    pub(crate) fn node_tag(&self, id: NodeId) -> Option<String> {
        self.with_node(id, |data| match &data.content {
            Content::Object(map) => match map.get(TYPE_PROP) {
                Some(Child::Prim(crate::value::Primitive::Text(tag))) => Some(tag.clone()),
                _ => None,
            },
            Content::List(_) => None,
        })
        .ok()
        .flatten()
    }

    pub(crate) fn type_def_of(&self, id: NodeId) -> Option<Rc<TypeDef>> {
        let tag = self.node_tag(id)?;
        self.inner.types.borrow().get(&tag)
    }

    /// `(tag, key)` of a node; either part is `None` when absent.
    pub(crate) fn node_identity(&self, id: NodeId) -> (Option<String>, Option<InstanceKey>) {
        let Some(def) = self.type_def_of(id) else {
            return (self.node_tag(id), None);
        };
        let key = def
            .key_prop
            .as_ref()
            .and_then(|key_prop| self.instance_key_at(id, key_prop));
        (Some(def.tag.clone()), key)
    }

    fn instance_key_at(&self, id: NodeId, key_prop: &str) -> Option<InstanceKey> {
        self.with_node(id, |data| match &data.content {
            Content::Object(map) => map.get(key_prop).and_then(Child::instance_key),
            Content::List(_) => None,
        })
        .ok()
        .flatten()
    }

    /// `(tag, key)` of plain object data, computed the same way as
    /// [`Forest::node_identity`].
    pub(crate) fn data_identity(
        &self,
        map: &BTreeMap<String, Value>,
    ) -> (Option<String>, Option<InstanceKey>) {
        let tag = map.get(TYPE_PROP).and_then(Value::as_text).map(str::to_string);
        let key = tag
            .as_deref()
            .and_then(|tag| self.inner.types.borrow().get(tag))
            .and_then(|def| def.key_prop.clone())
            .and_then(|key_prop| map.get(&key_prop)?.instance_key());
        (tag, key)
    }

    /// `(tag, key)` of data belonging to a registered keyed type.
    pub(crate) fn keyed_identity(
        &self,
        map: &BTreeMap<String, Value>,
    ) -> Option<(String, InstanceKey)> {
        match self.data_identity(map) {
            (Some(tag), Some(key)) => Some((tag, key)),
            _ => None,
        }
    }

    /// The live node registered under the data's `(tag, key)`, if any.
    pub(crate) fn live_keyed_instance(&self, map: &BTreeMap<String, Value>) -> Option<NodeId> {
        let (tag, key) = self.keyed_identity(map)?;
        let id = self.inner.types.borrow().lookup_instance(&tag, &key)?;
        self.inner.arena.borrow().contains(id).then_some(id)
    }

    /// Rejects a write of `prop` on `id` that would change the type tag or
    /// key of a typed node. `value` is `None` for a removal.
    ///
    /// The registry indexes instances by the identity they had when built,
    /// so both parts are fixed for the node's lifetime. Tags nobody
    /// registered are plain data and may change freely.
    pub(crate) fn check_identity_write(
        &self,
        id: NodeId,
        prop: &str,
        value: Option<&Value>,
    ) -> Result<()> {
        if prop == TYPE_PROP {
            let current = self.node_tag(id);
            let next = value.and_then(Value::as_text).map(str::to_string);
            if current == next {
                return Ok(());
            }
            let types = self.inner.types.borrow();
            let registered = [&current, &next]
                .into_iter()
                .flatten()
                .any(|tag| types.get(tag).is_some());
            drop(types);
            if !registered {
                return Ok(());
            }
            return Err(NodeError::IdentityChange {
                field: TYPE_PROP.to_string(),
                from: describe_tag(current.as_ref()),
                to: describe_tag(next.as_ref()),
            }
            .into());
        }
        let Some(def) = self.type_def_of(id) else {
            return Ok(());
        };
        if def.key_prop.as_deref() != Some(prop) {
            return Ok(());
        }
        let current = self.instance_key_at(id, prop);
        let next = value.and_then(Value::instance_key);
        if current == next {
            return Ok(());
        }
        Err(NodeError::IdentityChange {
            field: prop.to_string(),
            from: describe_key(current.as_ref()),
            to: describe_key(next.as_ref()),
        }
        .into())
    }

    /// Runs each type's init hooks once per node, in the given order.
    pub(crate) fn run_init_hooks(&self, ids: &[NodeId]) -> Result<()> {
        for id in ids {
            let Some(def) = self.type_def_of(*id) else {
                continue;
            };
            let first = self
                .with_node_mut(*id, |data| !std::mem::replace(&mut data.initialized, true))
                .unwrap_or(false);
            if !first {
                continue;
            }
            let hooks: Vec<InitHook> = def
                .init_hooks
                .borrow()
                .iter()
                .map(|(_, hook)| hook.clone())
                .collect();
            if hooks.is_empty() {
                continue;
            }
            let node = self.handle_or_err(*id)?;
            trace!(node = %id, tag = %def.tag, hooks = hooks.len(), "running init hooks");
            for hook in hooks {
                hook(&node)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn describe_tag(tag: Option<&String>) -> String {
    match tag {
        Some(tag) => format!("'{tag}'"),
        None => "none".to_string(),
    }
}

/// Text keys render quoted, integer keys bare.
pub(crate) fn describe_key(key: Option<&InstanceKey>) -> String {
    match key {
        Some(key) => key.to_string(),
        None => "none".to_string(),
    }
}
