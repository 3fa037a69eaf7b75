//! Single-threaded reactive substrate.
//!
//! The runtime tracks three kinds of participants:
//!
//! - **Atoms**: observable cells. Reading reports the atom to whichever
//!   observer is currently tracking; writing invalidates its observers.
//! - **Reactions**: side-effecting observers (autoruns, snapshot listeners)
//!   that re-run after the outermost batch ends.
//! - **Derivations**: memoized computations ([`Computed`]) that are marked
//!   stale when a dependency changes and recompute lazily on the next read.
//!
//! Changes are only ever reported inside a batch. When the outermost batch
//! ends the runtime *settles*: it runs scheduled reactions, then drains the
//! settle-hook queue (used for garbage collection and CRDT flushes), looping
//! until both are empty.

mod computed;

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    rc::Rc,
};

use tracing::{error, trace, warn};

pub(crate) use computed::Computed;

use crate::{Result, constants::MAX_REACTION_RUNS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct AtomId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ObserverId(u64);

/// Deferred work run once the outermost batch has ended.
pub(crate) type SettleHook = Box<dyn FnOnce() -> Result<()>>;

enum ObserverKind {
    Reaction { run: Rc<dyn Fn()>, scheduled: bool },
    Derivation { stale: Rc<Cell<bool>>, atom: AtomId },
}

struct Observer {
    deps: HashSet<AtomId>,
    kind: ObserverKind,
}

struct Frame {
    observer: Option<ObserverId>,
    deps: HashSet<AtomId>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    atoms: HashMap<AtomId, BTreeSet<ObserverId>>,
    observers: HashMap<ObserverId, Observer>,
    tracking: Vec<Frame>,
    batch_depth: usize,
    action_depth: usize,
    pending: VecDeque<ObserverId>,
    settle: VecDeque<SettleHook>,
    /// Hooks held back until the current flush has finished
    parked: Vec<SettleHook>,
    flushing: bool,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Dependency tracker and batch scheduler shared by a forest.
///
/// No `RefCell` borrow is held while user callbacks run, so callbacks may
/// freely read and write observables.
#[derive(Default)]
pub(crate) struct Runtime {
    state: RefCell<State>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== ATOMS =====

    pub fn create_atom(&self) -> AtomId {
        let mut state = self.state.borrow_mut();
        let id = AtomId(state.next_id());
        state.atoms.insert(id, BTreeSet::new());
        id
    }

    pub fn drop_atom(&self, atom: AtomId) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.atoms.remove(&atom);
        }
    }

    /// Records a read of `atom` against the observer currently tracking.
    pub fn report_observed(&self, atom: AtomId) {
        let mut state = self.state.borrow_mut();
        if let Some(frame) = state.tracking.last_mut() {
            if frame.observer.is_some() {
                frame.deps.insert(atom);
            }
        }
    }

    /// Invalidates everything that depends on `atom`.
    ///
    /// Reactions are queued for the next settle; derivations are marked stale
    /// and their own observers are invalidated transitively.
    pub fn report_changed(&self, atom: AtomId) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let mut queue = vec![atom];
        while let Some(current) = queue.pop() {
            let Some(observers) = state.atoms.get(&current) else {
                continue;
            };
            let observers: Vec<ObserverId> = observers.iter().copied().collect();
            for id in observers {
                let Some(observer) = state.observers.get_mut(&id) else {
                    continue;
                };
                match &mut observer.kind {
                    ObserverKind::Reaction { scheduled, .. } => {
                        if !*scheduled {
                            *scheduled = true;
                            state.pending.push_back(id);
                        }
                    }
                    ObserverKind::Derivation { stale, atom } => {
                        if !stale.get() {
                            stale.set(true);
                            queue.push(*atom);
                        }
                    }
                }
            }
        }
    }

    // ===== OBSERVERS =====

    /// Registers a reaction and schedules its first run.
    pub fn create_reaction(&self, run: Rc<dyn Fn()>) -> ObserverId {
        let mut state = self.state.borrow_mut();
        let id = ObserverId(state.next_id());
        state.observers.insert(
            id,
            Observer {
                deps: HashSet::new(),
                kind: ObserverKind::Reaction {
                    run,
                    scheduled: true,
                },
            },
        );
        state.pending.push_back(id);
        id
    }

    /// Registers a derivation, returning its id, its change atom and its
    /// stale flag (initially set).
    pub fn create_derivation(&self) -> (ObserverId, AtomId, Rc<Cell<bool>>) {
        let mut state = self.state.borrow_mut();
        let id = ObserverId(state.next_id());
        let atom = AtomId(state.next_id());
        let stale = Rc::new(Cell::new(true));
        state.atoms.insert(atom, BTreeSet::new());
        state.observers.insert(
            id,
            Observer {
                deps: HashSet::new(),
                kind: ObserverKind::Derivation {
                    stale: stale.clone(),
                    atom,
                },
            },
        );
        (id, atom, stale)
    }

    pub fn dispose_observer(&self, id: ObserverId) {
        let Ok(mut guard) = self.state.try_borrow_mut() else {
            return;
        };
        let state = &mut *guard;
        if let Some(observer) = state.observers.remove(&id) {
            for atom in observer.deps {
                if let Some(observers) = state.atoms.get_mut(&atom) {
                    observers.remove(&id);
                }
            }
        }
        state.pending.retain(|pending| *pending != id);
    }

    /// Runs `f`, recording the atoms it reads as the dependencies of
    /// `observer`. With `None`, reads inside `f` are not tracked at all.
    pub fn track<R>(&self, observer: Option<ObserverId>, f: impl FnOnce() -> R) -> R {
        self.state.borrow_mut().tracking.push(Frame {
            observer,
            deps: HashSet::new(),
        });
        let _frame = FrameScope(self);
        f()
    }

    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.track(None, f)
    }

    fn finish_frame(&self) {
        let Ok(mut guard) = self.state.try_borrow_mut() else {
            return;
        };
        let state = &mut *guard;
        let Some(frame) = state.tracking.pop() else {
            return;
        };
        let Some(id) = frame.observer else {
            return;
        };
        let Some(observer) = state.observers.get_mut(&id) else {
            return;
        };
        let previous = std::mem::replace(&mut observer.deps, frame.deps.clone());
        for atom in previous.difference(&frame.deps) {
            if let Some(observers) = state.atoms.get_mut(atom) {
                observers.remove(&id);
            }
        }
        for atom in &frame.deps {
            if let Some(observers) = state.atoms.get_mut(atom) {
                observers.insert(id);
            }
        }
    }

    // ===== BATCHES AND ACTIONS =====

    pub fn in_batch(&self) -> bool {
        self.state.borrow().batch_depth > 0
    }

    pub fn in_action(&self) -> bool {
        self.state.borrow().action_depth > 0
    }

    /// Runs `f` as one batch. The runtime settles when the outermost batch
    /// ends, whether or not `f` failed; an error from `f` takes precedence
    /// over one from the settle hooks.
    pub fn batch<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.state.borrow_mut().batch_depth += 1;
        let mut scope = BatchScope {
            runtime: self,
            action: false,
            armed: true,
        };
        let result = f();
        scope.armed = false;
        drop(scope);
        let settled = self.end_batch();
        let value = result?;
        settled?;
        Ok(value)
    }

    /// Like [`Runtime::batch`], additionally marking the scope as an action
    /// for the purposes of strict mutation checks.
    pub fn action<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        {
            let mut state = self.state.borrow_mut();
            state.batch_depth += 1;
            state.action_depth += 1;
        }
        let mut scope = BatchScope {
            runtime: self,
            action: true,
            armed: true,
        };
        let result = f();
        scope.armed = false;
        drop(scope);
        self.state.borrow_mut().action_depth -= 1;
        let settled = self.end_batch();
        let value = result?;
        settled?;
        Ok(value)
    }

    fn end_batch(&self) -> Result<()> {
        let settle = {
            let mut state = self.state.borrow_mut();
            state.batch_depth = state.batch_depth.saturating_sub(1);
            state.batch_depth == 0 && !state.flushing
        };
        if settle { self.flush() } else { Ok(()) }
    }

    /// Queues `hook` to run once everything settles, running it right away
    /// when the runtime is idle.
    pub fn on_settled(&self, hook: SettleHook) -> Result<()> {
        let idle = {
            let mut state = self.state.borrow_mut();
            state.settle.push_back(hook);
            state.batch_depth == 0 && !state.flushing
        };
        if idle { self.flush() } else { Ok(()) }
    }

    /// Queues `hook` without ever running it synchronously.
    pub fn defer_to_settle(&self, hook: SettleHook) {
        self.state.borrow_mut().settle.push_back(hook);
    }

    /// Queues `hook` for the settle after the current one. Outside a flush
    /// this is the same as [`Runtime::defer_to_settle`].
    pub fn defer_to_next_settle(&self, hook: SettleHook) {
        let mut state = self.state.borrow_mut();
        if state.flushing {
            state.parked.push(hook);
        } else {
            state.settle.push_back(hook);
        }
    }

    /// Settles now if no batch is open.
    pub fn settle_if_idle(&self) -> Result<()> {
        let idle = {
            let state = self.state.borrow();
            state.batch_depth == 0 && !state.flushing
        };
        if idle { self.flush() } else { Ok(()) }
    }

    fn flush(&self) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            if state.flushing {
                return Ok(());
            }
            state.flushing = true;
        }
        let mut first_error = None;
        let mut runs = 0usize;
        loop {
            if let Some((id, run)) = self.next_reaction() {
                runs += 1;
                if runs > MAX_REACTION_RUNS {
                    error!(
                        runs,
                        "reactions did not settle; dropping the remaining queue"
                    );
                    self.state.borrow_mut().pending.clear();
                    continue;
                }
                trace!(observer = id.0, "running reaction");
                self.state.borrow_mut().batch_depth += 1;
                let _batch = BatchScope {
                    runtime: self,
                    action: false,
                    armed: true,
                };
                self.track(Some(id), || run());
                continue;
            }
            let hook = self.state.borrow_mut().settle.pop_front();
            let Some(hook) = hook else {
                break;
            };
            self.state.borrow_mut().batch_depth += 1;
            let outcome = {
                let _batch = BatchScope {
                    runtime: self,
                    action: false,
                    armed: true,
                };
                hook()
            };
            if let Err(err) = outcome {
                if first_error.is_none() {
                    first_error = Some(err);
                } else {
                    warn!(error = %err, "additional settle hook failure");
                }
            }
        }
        {
            let mut state = self.state.borrow_mut();
            state.flushing = false;
            let parked = std::mem::take(&mut state.parked);
            state.settle.extend(parked);
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_reaction(&self) -> Option<(ObserverId, Rc<dyn Fn()>)> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        while let Some(id) = state.pending.pop_front() {
            if let Some(Observer {
                kind: ObserverKind::Reaction { run, scheduled },
                ..
            }) = state.observers.get_mut(&id)
            {
                *scheduled = false;
                return Some((id, run.clone()));
            }
        }
        None
    }
}

struct FrameScope<'a>(&'a Runtime);

impl Drop for FrameScope<'_> {
    fn drop(&mut self) {
        self.0.finish_frame();
    }
}

/// Restores batch (and action) depth when dropped while armed, which only
/// happens during unwinding or inside the flush loop.
struct BatchScope<'a> {
    runtime: &'a Runtime,
    action: bool,
    armed: bool,
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut state) = self.runtime.state.try_borrow_mut() {
            state.batch_depth = state.batch_depth.saturating_sub(1);
            if self.action {
                state.action_depth = state.action_depth.saturating_sub(1);
            }
        }
    }
}
