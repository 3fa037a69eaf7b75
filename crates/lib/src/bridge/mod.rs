//! Two-way binding between a node tree and a Y-CRDT shared type.
//!
//! [`bind_yjs`] wraps the current content of a `yrs` map or array as a node
//! tree and keeps the two in sync:
//!
//! - **Outbound**: structural changes to the node tree are queued and
//!   written to the document in one transaction, tagged with the binding's
//!   origin, once the surrounding batch settles.
//! - **Inbound**: document changes from any other origin are replayed onto
//!   the node tree inside a single action, reconciling new data against
//!   existing nodes so keyed nodes keep their identity.
//!
//! Replayed changes are never echoed back: node changes made while a replay
//! is in progress are ignored by the outbound side, and document changes
//! carrying the binding's own origin are ignored by the inbound side.
//!
//! Inbound failures cannot be returned to a caller (they happen inside the
//! document's observer callback). They are logged, parked for
//! [`Binding::take_error`], and halt further replay since node and document
//! may have diverged.
//!
//! ```
//! use canopy::{Forest, bridge::bind_yjs};
//! use yrs::{Doc, Map, Transact};
//!
//! let doc = Doc::new();
//! let state = doc.get_or_insert_map("state");
//! let forest = Forest::new();
//! let binding = bind_yjs(&forest, &doc, state.clone()).unwrap();
//!
//! binding.node().set("count", 1).unwrap();
//! let txn = doc.transact();
//! assert_eq!(state.get(&txn, "count").unwrap().to_string(&txn), "1");
//! ```

mod convert;
mod errors;
mod guard;
mod inbound;
mod outbound;

use std::{
    cell::{Cell, RefCell},
    fmt,
};

use tracing::{debug, info};
use yrs::{ArrayRef, Doc, MapRef, Origin, Transact};

pub use errors::BridgeError;

use crate::{
    Error, Forest, Result, WeakForest,
    disposer::Disposer,
    node::{Node, NodeId},
};
use guard::ReplicationCounter;
use outbound::PendingChange;

/// The shared type a binding is rooted at.
#[derive(Clone, Debug)]
pub enum YRoot {
    Map(MapRef),
    Array(ArrayRef),
}

impl From<MapRef> for YRoot {
    fn from(map: MapRef) -> Self {
        YRoot::Map(map)
    }
}

impl From<ArrayRef> for YRoot {
    fn from(array: ArrayRef) -> Self {
        YRoot::Array(array)
    }
}

pub(crate) struct BridgeState {
    forest: WeakForest,
    root: NodeId,
    doc: Doc,
    y_root: YRoot,
    origin: Origin,
    replication: ReplicationCounter,
    queue: RefCell<Vec<PendingChange>>,
    flush_scheduled: Cell<bool>,
    error: RefCell<Option<Error>>,
    halted: Cell<bool>,
    disposed: Cell<bool>,
}

impl BridgeState {
    fn forest(&self) -> Option<Forest> {
        self.forest.upgrade()
    }

    /// Parks an error for [`Binding::take_error`]; the first one wins.
    fn record_error(&self, error: Error) {
        let mut slot = self.error.borrow_mut();
        if slot.is_none() {
            *slot = Some(error);
        }
    }
}

/// A live node/CRDT binding.
///
/// Dropping the binding disposes it.
pub struct Binding {
    node: Node,
    state: std::rc::Rc<BridgeState>,
    disposer: Disposer,
}

impl Binding {
    /// The bound root node.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Origin attached to every transaction this binding writes.
    pub fn origin(&self) -> &Origin {
        &self.state.origin
    }

    /// Stops syncing in both directions. Idempotent.
    pub fn dispose(&self) {
        if self.state.disposed.replace(true) {
            return;
        }
        self.disposer.dispose();
        self.state.queue.borrow_mut().clear();
        debug!(origin = ?self.state.origin, "binding disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.get()
    }

    /// True once an inbound replay failed and replay stopped.
    pub fn is_halted(&self) -> bool {
        self.state.halted.get()
    }

    /// Takes the first error raised inside a CRDT or node callback.
    pub fn take_error(&self) -> Option<Error> {
        self.state.error.borrow_mut().take()
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("node", &self.node)
            .field("disposed", &self.is_disposed())
            .field("halted", &self.is_halted())
            .finish()
    }
}

/// Binds a new node tree to `root` in `doc`.
///
/// Init hooks of typed nodes in the initial content run after both sync
/// directions are wired, so writes they make reach the document.
pub fn bind_yjs(forest: &Forest, doc: &Doc, root: impl Into<YRoot>) -> Result<Binding> {
    let y_root = root.into();
    let initial = {
        let txn = doc.transact();
        convert::root_to_value(&y_root, &txn)?
    };
    let node = forest.wrap_value(initial, false)?;
    let origin = Origin::from(format!("canopy:{}", uuid::Uuid::new_v4()).as_str());
    let state = std::rc::Rc::new(BridgeState {
        forest: forest.downgrade(),
        root: node.id(),
        doc: doc.clone(),
        y_root,
        origin,
        replication: ReplicationCounter::default(),
        queue: RefCell::new(Vec::new()),
        flush_scheduled: Cell::new(false),
        error: RefCell::new(None),
        halted: Cell::new(false),
        disposed: Cell::new(false),
    });

    let listener = outbound::install(forest, &node, &state)?;
    let subscription = inbound::install(&state);
    let disposer = Disposer::new(move || {
        listener.dispose();
        drop(subscription);
    });
    let binding = Binding {
        node,
        state,
        disposer,
    };

    forest.initialize(&binding.node)?;
    info!(node = %binding.node.id(), origin = ?binding.state.origin, "bound node tree to CRDT");
    Ok(binding)
}

impl Forest {
    /// Shorthand for [`bind_yjs`].
    pub fn bind_yjs(&self, doc: &Doc, root: impl Into<YRoot>) -> Result<Binding> {
        bind_yjs(self, doc, root)
    }
}
