//! Update Scheduler
//!
//! Writes never run subscribers synchronously. Instead each subscriber is
//! queued here, and the whole queue is drained by a single flush at the next
//! deferred checkpoint. Any number of writes within one synchronous turn
//! therefore cost each affected effect at most one rerun.
//!
//! # Algorithm
//!
//! 1. `schedule` appends the effect to an ordered set (duplicates are
//!    ignored). If the scheduler was idle it becomes pending and asks the
//!    installed [`Defer`] primitive to arrange a flush.
//! 2. `flush` snapshots the queue, clears it and runs every job of the
//!    snapshot in insertion order. Jobs queued meanwhile land in the fresh
//!    queue, so the loop repeats until a snapshot comes back empty.
//! 3. Only one drain is ever active. A `flush` call from inside a running
//!    job returns immediately; the outer drain picks up whatever was queued.
//!
//! Order is insertion order, not dependency order. An effect queued ahead of
//! the effect that feeds it can observe a stale intermediate value within
//! the batch. That is the intended behavior of this runtime.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexSet;

use super::effect::run_effect;
use super::node::EffectId;
use super::runtime::Runtime;
use crate::config::{Deferral, ErrorPolicy};
use crate::error::{EffectFailure, Error, Result};

/// Flush lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushState {
    /// Nothing queued, no flush arranged.
    Idle,
    /// Jobs queued and a flush arranged but not yet started.
    Pending,
    /// A flush is draining the queue.
    Draining,
}

/// Pending rerun jobs plus the flush state.
pub(crate) struct Scheduler {
    queue: RefCell<IndexSet<EffectId>>,
    state: Cell<FlushState>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            queue: RefCell::new(IndexSet::new()),
            state: Cell::new(FlushState::Idle),
        }
    }

    /// Queue `effect`. Returns true when the caller must arm the deferrer.
    fn enqueue(&self, effect: EffectId) -> bool {
        self.queue.borrow_mut().insert(effect);
        if self.state.get() == FlushState::Idle {
            self.state.set(FlushState::Pending);
            true
        } else {
            false
        }
    }

    /// Drop a queued job, e.g. because its effect was disposed.
    pub(crate) fn cancel(&self, effect: EffectId) {
        self.queue.borrow_mut().shift_remove(&effect);
    }

    /// Enter the draining state. Returns false if a drain is already active.
    fn begin_drain(&self) -> bool {
        if self.state.get() == FlushState::Draining {
            return false;
        }
        self.state.set(FlushState::Draining);
        true
    }

    fn take_batch(&self) -> IndexSet<EffectId> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }

    /// Put unrun jobs back ahead of anything queued since the batch was taken.
    fn requeue_front(&self, remaining: impl IntoIterator<Item = EffectId>) {
        let mut queue = self.queue.borrow_mut();
        let mut restored: IndexSet<EffectId> = remaining.into_iter().collect();
        restored.extend(queue.drain(..));
        *queue = restored;
    }

    /// Leave the draining state. Returns true when jobs remain and the
    /// caller must arm the deferrer again.
    fn end_drain(&self) -> bool {
        if self.queue.borrow().is_empty() {
            self.state.set(FlushState::Idle);
            false
        } else {
            self.state.set(FlushState::Pending);
            true
        }
    }

    fn len(&self) -> usize {
        self.queue.borrow().len()
    }
}

/// Queue an effect rerun for the next flush.
pub(crate) fn schedule(effect: EffectId) {
    let arm = Runtime::with(|rt| rt.scheduler.enqueue(effect));
    if arm {
        arm_deferrer();
    }
}

fn arm_deferrer() {
    let deferrer = Runtime::with(Runtime::deferrer);
    deferrer.defer(deferred_flush);
}

/// Run every pending effect, including any queued while flushing.
///
/// Returns an error describing the effects that panicked. Under
/// [`ErrorPolicy::Isolate`] every job still runs; under
/// [`ErrorPolicy::Abort`] the flush stops at the first panic and the jobs
/// that did not run stay queued.
///
/// Calling `flush` from inside an effect is a no-op.
pub fn flush() -> Result<()> {
    let (started, policy) = Runtime::with(|rt| (rt.scheduler.begin_drain(), rt.config().error_policy));
    if !started {
        tracing::warn!("flush requested while already flushing; ignored");
        return Ok(());
    }

    let mut failures = Vec::new();
    let mut passes = 0usize;
    let mut jobs_run = 0usize;

    'drain: loop {
        let batch = Runtime::with(|rt| rt.scheduler.take_batch());
        if batch.is_empty() {
            break;
        }
        passes += 1;
        tracing::debug!(pass = passes, jobs = batch.len(), "flush pass");

        let mut jobs = batch.into_iter();
        while let Some(effect) = jobs.next() {
            jobs_run += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_effect(effect)));
            let Err(payload) = outcome else {
                continue;
            };

            let failure = EffectFailure::from_panic(effect, payload);
            tracing::error!(effect = ?failure.effect, message = %failure.message, "effect panicked during flush");
            failures.push(failure);

            if policy == ErrorPolicy::Abort {
                Runtime::with(|rt| rt.scheduler.requeue_front(jobs));
                break 'drain;
            }
        }
    }

    let rearm = Runtime::with(|rt| rt.scheduler.end_drain());
    tracing::debug!(passes, jobs = jobs_run, failures = failures.len(), "flush finished");
    if rearm {
        arm_deferrer();
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::EffectsPanicked(failures))
    }
}

/// Entry point handed to deferrers. There is no caller to return errors to,
/// so they are logged.
fn deferred_flush() {
    if let Err(err) = flush() {
        tracing::error!(error = %err, "deferred flush failed");
    }
}

/// Number of effect reruns waiting for the next flush.
pub fn pending_jobs() -> usize {
    Runtime::with(|rt| rt.scheduler.len())
}

/// Whether a flush has been arranged and has not started yet.
pub fn is_flush_pending() -> bool {
    Runtime::with(|rt| rt.scheduler.state.get() == FlushState::Pending)
}

// ----------------------------------------------------------------------------
// Deferral
// ----------------------------------------------------------------------------

/// A deferred-execution primitive: arranges for `flush` to be called after
/// the current synchronous unit of work, before later independent work.
pub trait Defer {
    fn defer(&self, flush: fn());
}

/// Leaves flushing to the host, which calls [`flush`] explicitly.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualDefer;

impl Defer for ManualDefer {
    fn defer(&self, _flush: fn()) {}
}

/// Spawns the flush onto the current `tokio::task::LocalSet`.
///
/// # Panics
///
/// Arming this deferrer outside a `LocalSet` panics, as
/// `tokio::task::spawn_local` does.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioLocalDefer;

impl Defer for TokioLocalDefer {
    fn defer(&self, flush: fn()) {
        tokio::task::spawn_local(async move { flush() });
    }
}

impl Deferral {
    pub(crate) fn deferrer(self) -> Rc<dyn Defer> {
        match self {
            Deferral::Manual => Rc::new(ManualDefer),
            Deferral::TokioLocal => Rc::new(TokioLocalDefer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(count: usize) -> Vec<EffectId> {
        let mut arena: SlotMap<EffectId, ()> = SlotMap::with_key();
        (0..count).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn enqueue_dedups_and_arms_once() {
        let scheduler = Scheduler::new();
        let ids = ids(2);

        assert!(scheduler.enqueue(ids[0]));
        assert!(!scheduler.enqueue(ids[0]));
        assert!(!scheduler.enqueue(ids[1]));
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.state.get(), FlushState::Pending);
    }

    #[test]
    fn draining_rejects_second_drain() {
        let scheduler = Scheduler::new();
        assert!(scheduler.begin_drain());
        assert!(!scheduler.begin_drain());

        // Enqueue while draining does not arm another flush.
        assert!(!scheduler.enqueue(ids(1)[0]));
        assert!(scheduler.end_drain());
        assert_eq!(scheduler.state.get(), FlushState::Pending);
    }

    #[test]
    fn requeue_front_keeps_unrun_jobs_first() {
        let scheduler = Scheduler::new();
        let ids = ids(3);
        scheduler.enqueue(ids[2]);

        scheduler.requeue_front([ids[0], ids[1], ids[2]]);

        let batch: Vec<_> = scheduler.take_batch().into_iter().collect();
        assert_eq!(batch, vec![ids[0], ids[1], ids[2]]);
    }

    #[test]
    fn cancel_removes_job() {
        let scheduler = Scheduler::new();
        let ids = ids(2);
        scheduler.enqueue(ids[0]);
        scheduler.enqueue(ids[1]);

        scheduler.cancel(ids[0]);

        let batch: Vec<_> = scheduler.take_batch().into_iter().collect();
        assert_eq!(batch, vec![ids[1]]);
    }

    #[test]
    fn flush_with_empty_queue_is_ok() {
        assert!(flush().is_ok());
        assert_eq!(pending_jobs(), 0);
        assert!(!is_flush_pending());
    }

    #[test]
    fn custom_deferrer_is_armed_once_per_batch() {
        use crate::reactive::{effect, signal};
        use std::cell::Cell as StdCell;

        thread_local! {
            static ARMED: StdCell<usize> = const { StdCell::new(0) };
        }

        struct Counting;
        impl Defer for Counting {
            fn defer(&self, _flush: fn()) {
                ARMED.with(|armed| armed.set(armed.get() + 1));
            }
        }

        crate::reactive::set_deferrer(Rc::new(Counting));

        let (count, set_count) = signal(0);
        let _watcher = effect(move || {
            count.get();
        });

        set_count.set(1);
        set_count.set(2);
        assert_eq!(ARMED.with(StdCell::get), 1);
        assert!(is_flush_pending());

        flush().unwrap();
        assert!(!is_flush_pending());

        set_count.set(3);
        assert_eq!(ARMED.with(StdCell::get), 2);
    }
}
