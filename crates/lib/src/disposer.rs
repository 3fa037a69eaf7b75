//! Idempotent cancellation handles for subscriptions and bindings.

use std::{cell::RefCell, fmt};

/// Cancels a subscription when disposed.
///
/// Calling [`Disposer::dispose`] more than once is a no-op. Dropping a
/// `Disposer` without disposing it leaves the subscription active.
pub struct Disposer {
    action: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Disposer {
    pub fn new(action: impl FnOnce() + 'static) -> Self {
        Self {
            action: RefCell::new(Some(Box::new(action))),
        }
    }

    /// A disposer with nothing to cancel.
    pub fn noop() -> Self {
        Self {
            action: RefCell::new(None),
        }
    }

    pub fn dispose(&self) {
        // Take before calling so a re-entrant dispose sees an empty slot.
        let action = self.action.borrow_mut().take();
        if let Some(action) = action {
            action();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.action.borrow().is_none()
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
