//! Fluent definition of node types.

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

use super::{
    ActionFn, ComputedDef, ComputedFn, DefaultFn, GetterFn, InitHook, TypeDef, TypeError,
    ValueEquals,
};
use crate::{Result, node::Node, value::Value};

/// Options for a computed member.
#[derive(Clone, Default)]
pub struct ComputedOptions {
    pub(crate) equals: Option<ValueEquals>,
}

impl ComputedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom equality: when it reports the recomputed value equal to the
    /// cached one, readers keep receiving the cached value.
    pub fn equals(mut self, equals: impl Fn(&Value, &Value) -> bool + 'static) -> Self {
        self.equals = Some(Rc::new(equals));
        self
    }
}

/// Declares a node type: tag, optional key property, defaults and members.
///
/// Definition errors such as a second key property or a duplicate member
/// name are recorded and reported by
/// [`Forest::register_type`](crate::Forest::register_type), so the builder
/// chain itself never fails.
///
/// ```
/// use canopy::{Forest, NodeTypeBuilder, Value};
///
/// let forest = Forest::new();
/// let counter = forest
///     .register_type(
///         NodeTypeBuilder::new("counter")
///             .default_value("count", || Value::Int(0))
///             .action("increment", |node, _| {
///                 let count = node.get("count").and_then(|v| v.as_int()).unwrap_or(0);
///                 node.set("count", count + 1)?;
///                 Ok(Value::Null)
///             }),
///     )
///     .unwrap();
///
/// let node = counter.create(Value::object()).unwrap();
/// counter.call("increment", &node, &[]).unwrap();
/// assert_eq!(node.get("count"), Some(Value::Int(1)));
/// ```
pub struct NodeTypeBuilder {
    tag: String,
    key_prop: Option<String>,
    defaults: BTreeMap<String, DefaultFn>,
    actions: BTreeMap<String, ActionFn>,
    getters: BTreeMap<String, GetterFn>,
    computeds: BTreeMap<String, ComputedDef>,
    volatiles: BTreeMap<String, DefaultFn>,
    init_hooks: Vec<InitHook>,
    members: BTreeSet<String>,
    error: Option<TypeError>,
}

impl NodeTypeBuilder {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            key_prop: None,
            defaults: BTreeMap::new(),
            actions: BTreeMap::new(),
            getters: BTreeMap::new(),
            computeds: BTreeMap::new(),
            volatiles: BTreeMap::new(),
            init_hooks: Vec::new(),
            members: BTreeSet::new(),
            error: None,
        }
    }

    fn fail(&mut self, error: TypeError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn claim(&mut self, name: &str) -> bool {
        if self.members.insert(name.to_string()) {
            return true;
        }
        let error = TypeError::DuplicateMember {
            tag: self.tag.clone(),
            name: name.to_string(),
        };
        self.fail(error);
        false
    }

    /// Declares the uniqueness key property. A type has at most one.
    pub fn with_key(mut self, prop: impl Into<String>) -> Self {
        let prop = prop.into();
        match &self.key_prop {
            Some(existing) => {
                let error = TypeError::DuplicateKey {
                    tag: self.tag.clone(),
                    existing: existing.clone(),
                    attempted: prop,
                };
                self.fail(error);
            }
            None => self.key_prop = Some(prop),
        }
        self
    }

    /// Default for a property left absent or null at creation. Declaring the
    /// same property again replaces the earlier default.
    pub fn default_value(mut self, prop: impl Into<String>, f: impl Fn() -> Value + 'static) -> Self {
        self.defaults.insert(prop.into(), Rc::new(f));
        self
    }

    pub fn defaults<I, K>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, DefaultFn)>,
        K: Into<String>,
    {
        for (prop, f) in entries {
            self.defaults.insert(prop.into(), f);
        }
        self
    }

    /// An action: runs batched, as an action, with the node as receiver.
    pub fn action(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Node, &[Value]) -> Result<Value> + 'static,
    ) -> Self {
        let name = name.into();
        if self.claim(&name) {
            self.actions.insert(name, Rc::new(f));
        }
        self
    }

    pub fn actions<I, K>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ActionFn)>,
        K: Into<String>,
    {
        for (name, f) in entries {
            let name = name.into();
            if self.claim(&name) {
                self.actions.insert(name, f);
            }
        }
        self
    }

    /// A plain (non-memoized) read-only accessor.
    pub fn getter(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Node, &[Value]) -> Value + 'static,
    ) -> Self {
        let name = name.into();
        if self.claim(&name) {
            self.getters.insert(name, Rc::new(f));
        }
        self
    }

    pub fn getters<I, K>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, GetterFn)>,
        K: Into<String>,
    {
        for (name, f) in entries {
            let name = name.into();
            if self.claim(&name) {
                self.getters.insert(name, f);
            }
        }
        self
    }

    /// A memoized derivation, cached per node until its inputs change.
    pub fn computed(self, name: impl Into<String>, f: impl Fn(&Node) -> Value + 'static) -> Self {
        self.computed_with(name, f, ComputedOptions::default())
    }

    pub fn computed_with(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Node) -> Value + 'static,
        options: ComputedOptions,
    ) -> Self {
        let name = name.into();
        if self.claim(&name) {
            let derive: ComputedFn = Rc::new(f);
            self.computeds.insert(
                name,
                ComputedDef {
                    derive,
                    equals: options.equals,
                },
            );
        }
        self
    }

    /// Per-node, non-persistent reactive state with a lazily evaluated
    /// default. Volatile state never appears in snapshots.
    pub fn volatile(mut self, name: impl Into<String>, default: impl Fn() -> Value + 'static) -> Self {
        let name = name.into();
        if self.volatiles.contains_key(&name) {
            let error = TypeError::DuplicateMember {
                tag: self.tag.clone(),
                name,
            };
            self.fail(error);
            return self;
        }
        self.volatiles.insert(name, Rc::new(default));
        self
    }

    /// Generates a `set_<prop>` action for each property.
    pub fn setters_for<I, K>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        for prop in props {
            let prop = prop.into();
            let name = format!("set_{prop}");
            if self.claim(&name) {
                let setter: ActionFn = Rc::new(move |node: &Node, args: &[Value]| {
                    node.set(prop.as_str(), args.first().cloned().unwrap_or_default())?;
                    Ok(Value::Null)
                });
                self.actions.insert(name, setter);
            }
        }
        self
    }

    /// Runs once per instance, children before parents, after the instance
    /// is first wrapped.
    pub fn on_init(mut self, hook: impl Fn(&Node) -> Result<()> + 'static) -> Self {
        self.init_hooks.push(Rc::new(hook));
        self
    }

    pub(crate) fn build(self) -> std::result::Result<TypeDef, TypeError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let hooks: Vec<(u64, InitHook)> = self
            .init_hooks
            .into_iter()
            .enumerate()
            .map(|(index, hook)| (index as u64, hook))
            .collect();
        let next_hook = hooks.len() as u64;
        Ok(TypeDef {
            tag: self.tag,
            key_prop: self.key_prop,
            defaults: self.defaults,
            actions: self.actions,
            getters: self.getters,
            computeds: self.computeds,
            volatiles: self.volatiles,
            init_hooks: RefCell::new(hooks),
            next_hook: Cell::new(next_hook),
        })
    }
}
