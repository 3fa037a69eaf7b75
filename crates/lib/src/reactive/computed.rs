use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use super::{AtomId, ObserverId, Runtime};

/// Equality used to decide whether a recomputed value replaces the cached one.
pub(crate) type EqualsFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Lazily recomputed, memoized derivation.
///
/// The derivation itself is supplied on each read, so a `Computed` can be
/// stored per node while the deriving closure lives on the type definition.
pub(crate) struct Computed<T> {
    runtime: Rc<Runtime>,
    observer: ObserverId,
    atom: AtomId,
    stale: Rc<Cell<bool>>,
    value: RefCell<Option<T>>,
    equals: Option<EqualsFn<T>>,
}

impl<T: Clone> Computed<T> {
    pub fn new(runtime: Rc<Runtime>, equals: Option<EqualsFn<T>>) -> Self {
        let (observer, atom, stale) = runtime.create_derivation();
        Self {
            runtime,
            observer,
            atom,
            stale,
            value: RefCell::new(None),
            equals,
        }
    }

    /// Returns the cached value, re-deriving it first if a dependency changed.
    ///
    /// When a custom equality considers the fresh value equal to the cached
    /// one, the cached value is kept.
    pub fn get_with(&self, derive: impl FnOnce() -> T) -> T {
        self.runtime.report_observed(self.atom);
        if !self.stale.get() {
            let cached = self.value.borrow().clone();
            if let Some(cached) = cached {
                return cached;
            }
        }
        let fresh = self.runtime.track(Some(self.observer), derive);
        self.stale.set(false);
        let mut slot = self.value.borrow_mut();
        let keep = match (slot.as_ref(), self.equals.as_ref()) {
            (Some(old), Some(equals)) => equals(old, &fresh),
            _ => false,
        };
        if keep {
            if let Some(old) = slot.as_ref() {
                return old.clone();
            }
        }
        *slot = Some(fresh.clone());
        fresh
    }
}

impl<T> Computed<T> {
    /// Drops the cached value; the next read derives afresh.
    pub fn release(&self) {
        if let Ok(mut slot) = self.value.try_borrow_mut() {
            slot.take();
        }
        self.stale.set(true);
    }
}

impl<T> Drop for Computed<T> {
    fn drop(&mut self) {
        self.runtime.dispose_observer(self.observer);
        self.runtime.drop_atom(self.atom);
    }
}
