//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells, effects and
//! the scheduler. It owns the dependency graph and the pending-job queue.
//!
//! # How It Works
//!
//! 1. When a cell is created, it registers a node in the cell arena.
//!
//! 2. When an effect reads a cell, the runtime records the edge on both
//!    sides: the cell's subscriber set and the effect's dependency set.
//!
//! 3. When a cell's value changes, every current subscriber is handed to the
//!    scheduler. Nothing runs synchronously.
//!
//! 4. When an effect reruns or is disposed, it removes itself from every
//!    cell it depended on, so the graph always reflects the latest run.
//!
//! # Threading
//!
//! The runtime is thread-local. Each thread has its own independent graph,
//! and none of the handles are `Send`. Borrows of the arenas are never held
//! while user code runs: bodies, cleanups and drops of user closures all
//! happen after the relevant `RefCell` borrow has been released.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use slotmap::SlotMap;
use smallvec::SmallVec;

use super::effect::Cleanup;
use super::node::{CellId, CellNode, EffectId, EffectNode};
use super::scheduler::{Defer, Scheduler};
use crate::config::RuntimeConfig;

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// The per-thread reactive runtime.
pub(crate) struct Runtime {
    pub(crate) cells: RefCell<SlotMap<CellId, CellNode>>,
    pub(crate) effects: RefCell<SlotMap<EffectId, EffectNode>>,
    pub(crate) scheduler: Scheduler,
    config: Cell<RuntimeConfig>,
    deferrer: RefCell<Rc<dyn Defer>>,
}

impl Runtime {
    fn new() -> Self {
        let config = RuntimeConfig::default();
        Self {
            cells: RefCell::new(SlotMap::with_key()),
            effects: RefCell::new(SlotMap::with_key()),
            scheduler: Scheduler::new(),
            config: Cell::new(config),
            deferrer: RefCell::new(config.deferral.deferrer()),
        }
    }

    /// Run `f` against this thread's runtime.
    pub(crate) fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }

    /// Like [`Runtime::with`], but returns `None` during thread teardown.
    /// Used from `Drop` impls.
    pub(crate) fn try_with<R>(f: impl FnOnce(&Runtime) -> R) -> Option<R> {
        RUNTIME.try_with(f).ok()
    }

    // ------------------------------------------------------------------
    // Cells
    // ------------------------------------------------------------------

    pub(crate) fn create_cell(&self) -> CellId {
        self.cells.borrow_mut().insert(CellNode::default())
    }

    /// Remove a cell and every edge pointing at it.
    pub(crate) fn remove_cell(&self, cell: CellId) {
        let Some(node) = self.cells.borrow_mut().remove(cell) else {
            return;
        };
        let mut effects = self.effects.borrow_mut();
        for subscriber in node.subscribers {
            if let Some(effect) = effects.get_mut(subscriber) {
                effect.dependencies.shift_remove(&cell);
            }
        }
    }

    /// Snapshot of the effects currently subscribed to `cell`, in
    /// subscription order.
    pub(crate) fn subscribers(&self, cell: CellId) -> SmallVec<[EffectId; 4]> {
        self.cells
            .borrow()
            .get(cell)
            .map(|node| node.subscribers.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn subscriber_count(&self, cell: CellId) -> usize {
        self.cells
            .borrow()
            .get(cell)
            .map_or(0, |node| node.subscribers.len())
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Record that `effect` read `cell`. Both ends must still exist.
    pub(crate) fn link(&self, cell: CellId, effect: EffectId) {
        let mut effects = self.effects.borrow_mut();
        let mut cells = self.cells.borrow_mut();
        if let (Some(effect_node), Some(cell_node)) = (effects.get_mut(effect), cells.get_mut(cell)) {
            effect_node.dependencies.insert(cell);
            cell_node.subscribers.insert(effect);
        }
    }

    /// Sever every dependency edge of `effect` and clear its dependency set.
    pub(crate) fn unlink_all(&self, effect: EffectId) {
        let mut effects = self.effects.borrow_mut();
        let Some(node) = effects.get_mut(effect) else {
            return;
        };
        let dependencies = std::mem::take(&mut node.dependencies);
        let mut cells = self.cells.borrow_mut();
        for cell in dependencies {
            if let Some(cell_node) = cells.get_mut(cell) {
                cell_node.subscribers.shift_remove(&effect);
            }
        }
    }

    /// Subscribe `reader` to every cell `source` currently depends on.
    pub(crate) fn adopt_dependencies(&self, source: EffectId, reader: EffectId) {
        let dependencies: SmallVec<[CellId; 4]> = match self.effects.borrow().get(source) {
            Some(node) => node.dependencies.iter().copied().collect(),
            None => return,
        };
        for cell in dependencies {
            self.link(cell, reader);
        }
    }

    pub(crate) fn dependency_count(&self, effect: EffectId) -> usize {
        self.effects
            .borrow()
            .get(effect)
            .map_or(0, |node| node.dependencies.len())
    }

    /// Append a cleanup to a live effect. Hands the cleanup back if the
    /// effect no longer exists.
    pub(crate) fn push_cleanup(&self, effect: EffectId, cleanup: Cleanup) -> Result<(), Cleanup> {
        match self.effects.borrow_mut().get_mut(effect) {
            Some(node) => {
                node.cleanups.push(cleanup);
                Ok(())
            }
            None => Err(cleanup),
        }
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub(crate) fn config(&self) -> RuntimeConfig {
        self.config.get()
    }

    pub(crate) fn deferrer(&self) -> Rc<dyn Defer> {
        Rc::clone(&self.deferrer.borrow())
    }

    fn replace_deferrer(&self, deferrer: Rc<dyn Defer>) -> Rc<dyn Defer> {
        self.deferrer.replace(deferrer)
    }
}

/// Apply `config` to this thread's runtime, installing the deferrer that
/// matches its [`Deferral`](crate::config::Deferral).
pub fn configure(config: RuntimeConfig) {
    let previous = Runtime::with(|rt| {
        rt.config.set(config);
        rt.replace_deferrer(config.deferral.deferrer())
    });
    tracing::debug!(?config, "runtime configured");
    drop(previous);
}

/// The configuration currently applied to this thread's runtime.
pub fn current_config() -> RuntimeConfig {
    Runtime::with(Runtime::config)
}

/// Install a custom deferral primitive. It is invoked once each time the
/// scheduler goes from idle to having pending work.
pub fn set_deferrer(deferrer: Rc<dyn Defer>) {
    let previous = Runtime::with(|rt| rt.replace_deferrer(deferrer));
    drop(previous);
}
