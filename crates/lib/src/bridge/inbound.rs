//! CRDT → node replication.

use std::rc::Rc;

use tracing::{error, trace};
use yrs::{
    DeepObservable, Subscription, TransactionMut,
    types::{Change as DeltaChange, EntryChange, Event, Events, PathSegment as YPathSegment},
};

use super::{BridgeError, BridgeState, YRoot, convert::out_to_value};
use crate::{
    Forest, Result,
    node::Node,
    path::{PathSegment, format_path},
};

pub(super) fn install(state: &Rc<BridgeState>) -> Subscription {
    let weak = Rc::downgrade(state);
    let callback = move |txn: &TransactionMut, events: &Events| {
        if let Some(state) = weak.upgrade() {
            state.replay(txn, events);
        }
    };
    match &state.y_root {
        YRoot::Map(map) => map.observe_deep(callback),
        YRoot::Array(array) => array.observe_deep(callback),
    }
}

impl BridgeState {
    /// Applies one committed CRDT transaction to the node tree.
    fn replay(&self, txn: &TransactionMut, events: &Events) {
        if self.disposed.get() || self.halted.get() {
            return;
        }
        if txn.origin() == Some(&self.origin) || events.iter().next().is_none() {
            return;
        }
        let Some(forest) = self.forest() else {
            return;
        };
        let _guard = self.replication.enter();
        let result = forest.action(|| {
            let root = forest.handle_or_err(self.root)?;
            for event in events.iter() {
                self.replay_event(&forest, &root, txn, event)?;
            }
            Ok(())
        });
        if let Err(err) = result {
            error!(error = %err, origin = ?txn.origin(), "failed to replay CRDT changes, halting binding");
            self.halted.set(true);
            self.record_error(err);
        }
    }

    fn replay_event(
        &self,
        forest: &Forest,
        root: &Node,
        txn: &TransactionMut,
        event: &Event,
    ) -> Result<()> {
        let path: Vec<PathSegment> = event
            .path()
            .into_iter()
            .map(|segment| match segment {
                YPathSegment::Key(key) => PathSegment::Key(key.to_string()),
                YPathSegment::Index(index) => PathSegment::Index(index as usize),
            })
            .collect();
        let target = forest
            .resolve_path(root, &path)
            .and_then(|value| value.into_node())
            .ok_or_else(|| BridgeError::PathUnresolved {
                side: "node tree",
                path: format_path(&path),
            })?;
        trace!(path = %format_path(&path), "replaying CRDT event");

        match event {
            Event::Map(map_event) => {
                if target.is_list() {
                    return Err(BridgeError::ShapeMismatch {
                        path: format_path(&path),
                        expected: "object",
                    }
                    .into());
                }
                let mut keys: Vec<_> = map_event.keys(txn).iter().collect();
                keys.sort_by(|a, b| a.0.cmp(b.0));
                for (key, change) in keys {
                    match change {
                        EntryChange::Inserted(new) | EntryChange::Updated(_, new) => {
                            let value = out_to_value(new, txn)?;
                            forest.reconcile_slot(&target, PathSegment::Key(key.to_string()), value)?;
                        }
                        EntryChange::Removed(_) => {
                            forest.remove(&target, key)?;
                        }
                    }
                }
                Ok(())
            }
            Event::Array(array_event) => {
                if !target.is_list() {
                    return Err(BridgeError::ShapeMismatch {
                        path: format_path(&path),
                        expected: "list",
                    }
                    .into());
                }
                let mut cursor = 0usize;
                for delta in array_event.delta(txn) {
                    match delta {
                        DeltaChange::Retain(count) => cursor += *count as usize,
                        DeltaChange::Removed(count) => {
                            forest.splice(&target, cursor, *count as usize, Vec::new())?;
                        }
                        DeltaChange::Added(items) => {
                            let values = items
                                .iter()
                                .map(|item| out_to_value(item, txn))
                                .collect::<Result<Vec<_>>>()?;
                            let count = values.len();
                            forest.insert_reconciled(&target, cursor, values)?;
                            cursor += count;
                        }
                    }
                }
                Ok(())
            }
            Event::Text(_) => Err(BridgeError::UnsupportedEvent { kind: "text" }.into()),
            _ => Err(BridgeError::UnsupportedEvent { kind: "xml" }.into()),
        }
    }
}
