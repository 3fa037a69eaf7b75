//! Re-entrancy guard for replicated writes.

use std::{cell::Cell, rc::Rc};

/// Counts replays in progress; node changes made while it is non-zero came
/// from the CRDT and must not be echoed back.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReplicationCounter(Rc<Cell<usize>>);

impl ReplicationCounter {
    pub fn is_replicating(&self) -> bool {
        self.0.get() > 0
    }

    pub fn enter(&self) -> ReplicationGuard {
        self.0.set(self.0.get() + 1);
        ReplicationGuard(self.0.clone())
    }
}

/// Leaves the replicating state on drop, including during unwinding.
pub(crate) struct ReplicationGuard(Rc<Cell<usize>>);

impl Drop for ReplicationGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}
