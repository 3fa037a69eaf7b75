//! Node → CRDT replication.
//!
//! Changes are captured as they happen (path and value snapshot at that
//! moment) and written to the document in a single transaction once the
//! batch that produced them settles.

use std::rc::Rc;

use tracing::{debug, warn};
use yrs::{Array, Map, Out, Transact, TransactionMut};

use super::{BridgeError, BridgeState, YRoot, convert::snapshot_to_in};
use crate::{
    Forest, Result,
    disposer::Disposer,
    node::{Change, ChangeEvent, Node},
    path::{PathSegment, format_path},
    reactive::SettleHook,
    snapshot::Snapshot,
};

#[derive(Debug, Clone)]
pub(crate) enum PendingOp {
    MapSet { key: String, value: Snapshot },
    MapDelete { key: String },
    ListReplace { index: usize, value: Snapshot },
    ListSplice {
        index: usize,
        removed: usize,
        inserted: Vec<Snapshot>,
    },
}

/// An operation on the shared type found at `path` below the bound root.
#[derive(Debug, Clone)]
pub(crate) struct PendingChange {
    path: Vec<PathSegment>,
    op: PendingOp,
}

pub(super) fn install(forest: &Forest, node: &Node, state: &Rc<BridgeState>) -> Result<Disposer> {
    let weak = Rc::downgrade(state);
    forest.on_deep_change(node, move |event| {
        if let Some(state) = weak.upgrade() {
            state.enqueue(event);
        }
    })
}

impl BridgeState {
    fn enqueue(self: &Rc<Self>, event: &ChangeEvent) {
        if self.disposed.get() || self.replication.is_replicating() {
            return;
        }
        let Some(forest) = self.forest() else {
            return;
        };
        match forest.untracked(|| self.capture(&forest, event)) {
            Ok(change) => self.queue.borrow_mut().push(change),
            Err(err) => {
                warn!(error = %err, "could not capture node change for the CRDT");
                self.record_error(err);
                return;
            }
        }
        self.schedule_flush(&forest, false);
    }

    /// Arranges one flush at the end of the current settle, or at the next
    /// settle when `retry` is set.
    fn schedule_flush(self: &Rc<Self>, forest: &Forest, retry: bool) {
        if self.flush_scheduled.replace(true) {
            return;
        }
        let weak = Rc::downgrade(self);
        let hook: SettleHook = Box::new(move || match weak.upgrade() {
            Some(state) => {
                state.flush_scheduled.set(false);
                state.flush()
            }
            None => Ok(()),
        });
        if retry {
            forest.inner.runtime.defer_to_next_settle(hook);
        } else {
            forest.inner.runtime.defer_to_settle(hook);
        }
    }

    fn capture(&self, forest: &Forest, event: &ChangeEvent) -> Result<PendingChange> {
        let root = forest.handle_or_err(self.root)?;
        let path = forest
            .parent_to_child_path(&root, &event.target)
            .ok_or_else(|| BridgeError::PathUnresolved {
                side: "node tree",
                path: event.target.path_string(),
            })?;
        let op = match &event.change {
            Change::Add { key, value } | Change::Update { key, new: value, .. } => PendingOp::MapSet {
                key: key.clone(),
                value: forest.value_snapshot(value)?,
            },
            Change::Remove { key, .. } => PendingOp::MapDelete { key: key.clone() },
            Change::ListUpdate { index, new, .. } => PendingOp::ListReplace {
                index: *index,
                value: forest.value_snapshot(new)?,
            },
            Change::Splice {
                index,
                removed,
                added,
            } => PendingOp::ListSplice {
                index: *index,
                removed: removed.len(),
                inserted: added
                    .iter()
                    .map(|value| forest.value_snapshot(value))
                    .collect::<Result<_>>()?,
            },
        };
        Ok(PendingChange { path, op })
    }

    /// Writes every queued change in one transaction tagged with this
    /// binding's origin. If the document is busy the changes stay queued
    /// and the flush is retried at the next settle.
    fn flush(self: &Rc<Self>) -> Result<()> {
        if self.disposed.get() {
            self.queue.borrow_mut().clear();
            return Ok(());
        }
        let changes = std::mem::take(&mut *self.queue.borrow_mut());
        if changes.is_empty() {
            return Ok(());
        }
        let mut txn = match self.doc.try_transact_mut_with(self.origin.clone()) {
            Ok(txn) => txn,
            Err(_) => {
                let pending = {
                    let mut queue = self.queue.borrow_mut();
                    let later = std::mem::replace(&mut *queue, changes);
                    queue.extend(later);
                    queue.len()
                };
                warn!(pending, "CRDT document busy, keeping node changes queued");
                if let Some(forest) = self.forest() {
                    self.schedule_flush(&forest, true);
                }
                return Err(BridgeError::TransactionUnavailable.into());
            }
        };
        debug!(changes = changes.len(), "writing node changes to the CRDT");
        for change in &changes {
            if let Err(err) = self.apply(&mut txn, change) {
                warn!(error = %err, path = %format_path(&change.path), "failed to write node change to the CRDT");
                return Err(err);
            }
        }
        Ok(())
    }

    fn apply(&self, txn: &mut TransactionMut, change: &PendingChange) -> Result<()> {
        let target = self.resolve(txn, &change.path)?;
        let shape_error = |expected| BridgeError::ShapeMismatch {
            path: format_path(&change.path),
            expected,
        };
        match (&change.op, target) {
            (PendingOp::MapSet { key, value }, YRoot::Map(map)) => {
                map.insert(txn, key.as_str(), snapshot_to_in(value));
            }
            (PendingOp::MapDelete { key }, YRoot::Map(map)) => {
                map.remove(txn, key);
            }
            (PendingOp::ListReplace { index, value }, YRoot::Array(array)) => {
                let index = *index as u32;
                if index < array.len(txn) {
                    array.remove(txn, index);
                }
                array.insert(txn, index, snapshot_to_in(value));
            }
            (
                PendingOp::ListSplice {
                    index,
                    removed,
                    inserted,
                },
                YRoot::Array(array),
            ) => {
                let index = *index as u32;
                if *removed > 0 {
                    array.remove_range(txn, index, *removed as u32);
                }
                for (offset, value) in inserted.iter().enumerate() {
                    array.insert(txn, index + offset as u32, snapshot_to_in(value));
                }
            }
            (PendingOp::MapSet { .. } | PendingOp::MapDelete { .. }, YRoot::Array(_)) => {
                return Err(shape_error("map").into());
            }
            (_, YRoot::Map(_)) => return Err(shape_error("array").into()),
        }
        Ok(())
    }

    /// Follows `path` from the bound root through nested shared types.
    fn resolve(&self, txn: &TransactionMut, path: &[PathSegment]) -> Result<YRoot> {
        let mut current = self.y_root.clone();
        for (depth, segment) in path.iter().enumerate() {
            let next = match (&current, segment) {
                (YRoot::Map(map), PathSegment::Key(key)) => map.get(txn, key),
                (YRoot::Array(array), PathSegment::Index(index)) => array.get(txn, *index as u32),
                _ => None,
            };
            current = match next {
                Some(Out::YMap(map)) => YRoot::Map(map),
                Some(Out::YArray(array)) => YRoot::Array(array),
                _ => {
                    return Err(BridgeError::PathUnresolved {
                        side: "CRDT",
                        path: format_path(&path[..=depth]),
                    }
                    .into());
                }
            };
        }
        Ok(current)
    }
}
