//! The forest: owner of every node, the reactive runtime and the type registry.
//!
//! All node state lives in a generational arena owned by the [`Forest`]; a
//! [`Node`] is a cheap handle (forest + id) that keeps its node alive while it
//! exists. Nodes that are detached, unreferenced by any handle and not
//! attached under a live parent are reclaimed when the surrounding batch
//! settles, and [`Forest::collect_garbage`] performs a full sweep.
//!
//! A `Forest` is single-threaded (`!Send`); clones share the same forest.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeSet,
    fmt,
    rc::{Rc, Weak},
};

use tracing::debug;

use crate::{
    Result,
    config::{ConfigOverride, ForestConfig},
    disposer::Disposer,
    node::{
        Node, NodeError,
        arena::{Arena, Content, NodeData, NodeId},
    },
    reactive::Runtime,
    types::registry::TypeRegistry,
    value::Value,
};

pub(crate) struct ForestInner {
    pub(crate) arena: RefCell<Arena>,
    pub(crate) runtime: Rc<Runtime>,
    pub(crate) types: RefCell<TypeRegistry>,
    pub(crate) config: RefCell<ForestConfig>,
    /// Detached nodes to examine at the next settle
    orphans: RefCell<BTreeSet<NodeId>>,
    collect_scheduled: Cell<bool>,
    next_listener: Cell<u64>,
}

/// Shared owner of a set of node trees.
#[derive(Clone)]
pub struct Forest {
    pub(crate) inner: Rc<ForestInner>,
}

/// Non-owning reference to a [`Forest`], used by long-lived callbacks.
#[derive(Clone)]
pub struct WeakForest(Weak<ForestInner>);

impl WeakForest {
    pub fn upgrade(&self) -> Option<Forest> {
        self.0.upgrade().map(|inner| Forest { inner })
    }
}

impl Forest {
    pub fn new() -> Self {
        Self::with_config(ForestConfig::default())
    }

    pub fn with_config(config: ForestConfig) -> Self {
        Self {
            inner: Rc::new(ForestInner {
                arena: RefCell::new(Arena::default()),
                runtime: Rc::new(Runtime::new()),
                types: RefCell::new(TypeRegistry::default()),
                config: RefCell::new(config),
                orphans: RefCell::new(BTreeSet::new()),
                collect_scheduled: Cell::new(false),
                next_listener: Cell::new(0),
            }),
        }
    }

    /// Applies a partial configuration override.
    pub fn configure(&self, overrides: ConfigOverride) {
        debug!(?overrides, "applying configuration override");
        overrides.apply_to(&mut self.inner.config.borrow_mut());
    }

    pub fn config(&self) -> ForestConfig {
        self.inner.config.borrow().clone()
    }

    pub fn downgrade(&self) -> WeakForest {
        WeakForest(Rc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Forest) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ===== TRANSACTIONS =====

    /// Runs `f` as an action: writes are batched, observers are notified and
    /// settle hooks run once the outermost action or batch ends.
    ///
    /// The first settle-hook failure is returned from the outermost call,
    /// unless `f` itself failed.
    pub fn action<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.inner.runtime.action(f)
    }

    /// Like [`Forest::action`] but does not count as an action for
    /// [`ForestConfig::enforce_actions`].
    pub fn batch<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.inner.runtime.batch(f)
    }

    pub fn in_action(&self) -> bool {
        self.inner.runtime.in_action()
    }

    /// Runs `f` now and again whenever anything it read changes.
    pub fn autorun(&self, f: impl Fn() + 'static) -> Result<Disposer> {
        let runtime = self.inner.runtime.clone();
        let id = runtime.create_reaction(Rc::new(f));
        runtime.settle_if_idle()?;
        let weak = Rc::downgrade(&runtime);
        Ok(Disposer::new(move || {
            if let Some(runtime) = weak.upgrade() {
                runtime.dispose_observer(id);
            }
        }))
    }

    /// Runs `f` without recording dependencies for the enclosing observer.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.runtime.untracked(f)
    }

    /// Schedules `hook` for when the current batch settles, or runs it now
    /// if nothing is in progress.
    pub fn on_settled(&self, hook: impl FnOnce() -> Result<()> + 'static) -> Result<()> {
        self.inner.runtime.on_settled(Box::new(hook))
    }

    // ===== NODE BOOKKEEPING =====

    /// Number of live nodes, including detached ones not yet collected.
    pub fn node_count(&self) -> usize {
        self.inner.arena.borrow().len()
    }

    /// Returns true if `value` is a live node of this forest.
    pub fn is_node(&self, value: &Value) -> bool {
        match value {
            Value::Node(node) => self.require(node).is_ok(),
            _ => false,
        }
    }

    pub(crate) fn require(&self, node: &Node) -> Result<NodeId> {
        if !self.ptr_eq(node.forest()) {
            return Err(NodeError::NotANode.into());
        }
        if !self.inner.arena.borrow().contains(node.id()) {
            return Err(NodeError::NotANode.into());
        }
        Ok(node.id())
    }

    /// Creates a handle, pinning the node for as long as handles exist.
    pub(crate) fn handle(&self, id: NodeId) -> Option<Node> {
        let mut arena = self.inner.arena.borrow_mut();
        let data = arena.get_mut(id)?;
        let pin = match data.pin.upgrade() {
            Some(pin) => pin,
            None => {
                let pin = Rc::new(());
                data.pin = Rc::downgrade(&pin);
                pin
            }
        };
        Some(Node::from_parts(self.clone(), id, pin))
    }

    pub(crate) fn handle_or_err(&self, id: NodeId) -> Result<Node> {
        self.handle(id).ok_or_else(|| NodeError::NotANode.into())
    }

    pub(crate) fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&NodeData) -> R) -> Result<R> {
        let arena = self.inner.arena.borrow();
        let data = arena.get(id).ok_or(NodeError::NotANode)?;
        Ok(f(data))
    }

    pub(crate) fn with_node_mut<R>(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut NodeData) -> R,
    ) -> Result<R> {
        let mut arena = self.inner.arena.borrow_mut();
        let data = arena.get_mut(id).ok_or(NodeError::NotANode)?;
        Ok(f(data))
    }

    pub(crate) fn alloc(&self, content: Content) -> NodeId {
        let runtime = &self.inner.runtime;
        let data = NodeData::new(content, runtime.create_atom(), runtime.create_atom());
        let id = self.inner.arena.borrow_mut().insert(data);
        self.mark_orphan(id);
        id
    }

    pub(crate) fn next_listener_id(&self) -> u64 {
        let id = self.inner.next_listener.get() + 1;
        self.inner.next_listener.set(id);
        id
    }

    // ===== GARBAGE COLLECTION =====

    /// Remembers a node that just became a root so the next settle can
    /// reclaim it if nothing references it.
    pub(crate) fn mark_orphan(&self, id: NodeId) {
        self.inner.orphans.borrow_mut().insert(id);
        if self.inner.collect_scheduled.replace(true) {
            return;
        }
        let weak = self.downgrade();
        self.inner.runtime.defer_to_settle(Box::new(move || {
            if let Some(forest) = weak.upgrade() {
                forest.inner.collect_scheduled.set(false);
                forest.collect_orphans();
            }
            Ok(())
        }));
    }

    fn collect_orphans(&self) -> usize {
        let candidates = std::mem::take(&mut *self.inner.orphans.borrow_mut());
        self.sweep(candidates.into_iter().collect())
    }

    /// Reclaims every detached tree that no handle references.
    ///
    /// Returns the number of nodes freed.
    pub fn collect_garbage(&self) -> usize {
        let roots = {
            let arena = self.inner.arena.borrow();
            arena
                .ids()
                .into_iter()
                .filter(|id| arena.get(*id).is_some_and(|data| data.parent.is_none()))
                .collect()
        };
        self.sweep(roots)
    }

    fn sweep(&self, roots: Vec<NodeId>) -> usize {
        let doomed: Vec<NodeId> = {
            let arena = self.inner.arena.borrow();
            let mut doomed = Vec::new();
            for root in roots {
                let Some(data) = arena.get(root) else {
                    continue;
                };
                if data.parent.is_some() {
                    continue;
                }
                let subtree = arena.subtree(root);
                let pinned = subtree
                    .iter()
                    .any(|id| arena.get(*id).is_some_and(NodeData::is_pinned));
                if !pinned {
                    doomed.extend(subtree);
                }
            }
            doomed
        };
        if doomed.is_empty() {
            return 0;
        }
        self.free(doomed)
    }

    /// Removes nodes and runs their finalizers: registry entries, listeners,
    /// memoized members and atoms go with them.
    fn free(&self, ids: Vec<NodeId>) -> usize {
        let mut removed: Vec<(NodeId, NodeData)> = {
            let mut arena = self.inner.arena.borrow_mut();
            ids.into_iter()
                .filter_map(|id| arena.remove(id).map(|data| (id, data)))
                .collect()
        };
        {
            let mut types = self.inner.types.borrow_mut();
            for (id, _) in &removed {
                types.forget_instance(*id);
            }
        }
        for (_, data) in &mut removed {
            data.computeds.clear();
            data.bound_actions.clear();
            for atom in data.atoms() {
                self.inner.runtime.drop_atom(atom);
            }
        }
        let count = removed.len();
        debug!(count, "collected unreachable nodes");
        count
    }
}

impl Default for Forest {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Forest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forest")
            .field("nodes", &self.node_count())
            .finish_non_exhaustive()
    }
}
