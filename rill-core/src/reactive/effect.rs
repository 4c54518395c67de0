//! Effect Implementation
//!
//! An Effect is a side-effecting computation that reruns whenever a cell it
//! read during its previous run changes.
//!
//! # How Effects Work
//!
//! Every run, including the first, goes through the same steps:
//!
//! 1. Run the cleanups registered by the previous run, in registration
//!    order, and clear the list.
//! 2. Remove the effect from every cell it previously depended on and clear
//!    its dependency set.
//! 3. Make the effect the current tracking context.
//! 4. Invoke the body. Each cell read links itself to the effect. If the
//!    body returns a [`Cleanup`], it is kept for the next run or disposal.
//! 5. Restore the previous tracking context, even if the body panicked. A
//!    panic then continues to the caller of the run.
//!
//! Because step 2 starts every run from an empty dependency set, an effect
//! that reads cell A on one run and cell B on the next ends up subscribed
//! only to the cell it actually read.
//!
//! # Disposal
//!
//! Effects are not garbage collected. The [`Effect`] handle returned at
//! creation is the only way to stop one: [`Effect::dispose`] severs all
//! edges, drops any queued rerun and runs the pending cleanups. Dropping the
//! handle without disposing leaves the effect alive for the rest of the
//! thread.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use super::context::ReactiveContext;
use super::node::{EffectBody, EffectId, EffectNode};
use super::runtime::Runtime;
use crate::error::panic_message;

/// A deferred teardown action registered by an effect run or a scope.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self(Box::new(f))
    }

    pub(crate) fn run(self) {
        (self.0)()
    }

    /// Run every cleanup in order, even if some panic. Returns the first
    /// panic payload once all of them have run.
    pub(crate) fn run_all(cleanups: impl IntoIterator<Item = Self>) -> thread::Result<()> {
        let mut first_panic = None;
        for cleanup in cleanups {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| cleanup.run())) {
                tracing::error!(message = %panic_message(payload.as_ref()), "cleanup panicked");
                if first_panic.is_none() {
                    first_panic = Some(payload);
                }
            }
        }
        first_panic.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values an effect body may return.
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

/// Handle to a tracked, rerunnable computation.
///
/// # Example
///
/// ```rust
/// use rill_core::reactive::{effect, flush, signal};
///
/// let (count, set_count) = signal(0);
/// let logger = effect(move || println!("count is {}", count.get()));
///
/// set_count.set(5);
/// flush().unwrap(); // prints "count is 5"
/// logger.dispose();
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Effect {
    id: EffectId,
}

impl Effect {
    /// Create an effect and run it immediately to establish its dependencies.
    pub fn new<F, C>(f: F) -> Self
    where
        F: FnMut() -> C + 'static,
        C: IntoCleanup,
    {
        effect_with(f, true)
    }

    /// Create an effect whose body first runs on the first dependency change.
    ///
    /// The creation-time run still happens, but skips the body, so the effect
    /// starts with no dependencies until something links it.
    pub fn new_lazy<F, C>(f: F) -> Self
    where
        F: FnMut() -> C + 'static,
        C: IntoCleanup,
    {
        effect_with(f, false)
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Run `f` with this effect as the tracking context, without invoking
    /// the body. Cells read by `f` become dependencies until the next run
    /// rebuilds them. This is how a lazy effect declares what should first
    /// trigger it.
    pub fn track<R>(&self, f: impl FnOnce() -> R) -> R {
        let _tracking = ReactiveContext::enter(Some(self.id));
        f()
    }

    /// Stop the effect for good. Idempotent.
    pub fn dispose(&self) {
        dispose_effect(self.id);
    }

    pub fn is_disposed(&self) -> bool {
        Runtime::with(|rt| !rt.effects.borrow().contains_key(self.id))
    }

    /// Number of times the body has been invoked.
    pub fn run_count(&self) -> usize {
        Runtime::with(|rt| rt.effects.borrow().get(self.id).map_or(0, |node| node.runs))
    }

    /// Number of cells read during the latest run.
    pub fn dependency_count(&self) -> usize {
        Runtime::with(|rt| rt.dependency_count(self.id))
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create an effect and run it immediately.
pub fn effect<F, C>(f: F) -> Effect
where
    F: FnMut() -> C + 'static,
    C: IntoCleanup,
{
    effect_with(f, true)
}

/// Create an effect. With `init_run` false the body is skipped on creation
/// and first runs when a dependency changes.
pub fn effect_with<F, C>(mut f: F, init_run: bool) -> Effect
where
    F: FnMut() -> C + 'static,
    C: IntoCleanup,
{
    let body: EffectBody = Box::new(move || f().into_cleanup());
    let id = Runtime::with(|rt| rt.effects.borrow_mut().insert(EffectNode::new(body, init_run)));
    tracing::trace!(effect = ?id, init_run, "effect created");

    run_effect(id);
    Effect { id }
}

/// Register `f` to run before the current effect's next run or at its
/// disposal. Outside of an effect the cleanup is dropped unrun.
pub fn on_cleanup<F>(f: F)
where
    F: FnOnce() + 'static,
{
    let Some(current) = ReactiveContext::current() else {
        tracing::warn!("on_cleanup called outside of a running effect; cleanup dropped");
        return;
    };
    if let Err(cleanup) = Runtime::with(|rt| rt.push_cleanup(current, Cleanup::new(f))) {
        drop(cleanup);
    }
}

/// Run one effect through the full rerun algorithm.
///
/// Does nothing if the effect was disposed or is already running.
pub(crate) fn run_effect(id: EffectId) {
    // 1. Previous cleanups.
    let cleanups = Runtime::with(|rt| {
        let mut effects = rt.effects.borrow_mut();
        match effects.get_mut(id) {
            Some(node) if node.body.is_some() => Ok(std::mem::take(&mut node.cleanups)),
            Some(_) => Err("running"),
            None => Err("disposed"),
        }
    });
    let cleanups = match cleanups {
        Ok(cleanups) => cleanups,
        Err(reason) => {
            tracing::trace!(effect = ?id, reason, "skipping effect run");
            return;
        }
    };
    if let Err(payload) = Cleanup::run_all(cleanups) {
        panic::resume_unwind(payload);
    }

    // 2. Previous edges. A cleanup may have disposed the effect.
    let claimed = Runtime::with(|rt| {
        rt.unlink_all(id);
        let mut effects = rt.effects.borrow_mut();
        let node = effects.get_mut(id)?;
        let skip = node.skips_body();
        Some((node.body.take(), skip))
    });
    let Some((mut body, skip)) = claimed else {
        return;
    };

    // 3-5. Tracked body invocation; the guard restores the context on unwind.
    let invoked = !skip && body.is_some();
    let outcome = {
        let _tracking = ReactiveContext::enter(Some(id));
        match body.as_mut() {
            Some(body) if !skip => panic::catch_unwind(AssertUnwindSafe(body)),
            _ => Ok(None),
        }
    };

    let (returned, cleanup) = match outcome {
        Ok(cleanup) => (None, cleanup),
        Err(payload) => (Some(payload), None),
    };

    let orphaned = Runtime::with(|rt| {
        let mut effects = rt.effects.borrow_mut();
        match effects.get_mut(id) {
            Some(node) => {
                node.first_run = false;
                if invoked {
                    node.runs += 1;
                }
                if node.body.is_none() {
                    node.body = body.take();
                }
                if let Some(cleanup) = cleanup {
                    node.cleanups.push(cleanup);
                }
                None
            }
            // Disposed during its own run.
            None => Some(cleanup),
        }
    });

    // Drop user closures only after the arena borrow is released.
    drop(body);
    if let Some(Some(cleanup)) = orphaned {
        cleanup.run();
    }

    if let Some(payload) = returned {
        panic::resume_unwind(payload);
    }
}

fn dispose_effect(id: EffectId) {
    let removed = Runtime::try_with(|rt| {
        rt.unlink_all(id);
        rt.scheduler.cancel(id);
        rt.effects.borrow_mut().remove(id)
    })
    .flatten();
    let Some(node) = removed else {
        return;
    };
    tracing::debug!(effect = ?id, cleanups = node.cleanups.len(), "effect disposed");

    let EffectNode { body, cleanups, .. } = node;
    let cleaned = Cleanup::run_all(cleanups);
    drop(body);
    if let Err(payload) = cleaned {
        panic::resume_unwind(payload);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
