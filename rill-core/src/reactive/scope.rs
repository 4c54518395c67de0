//! Scope and Ignore
//!
//! Both helpers suspend dependency tracking for the duration of a closure.
//! [`ignore`] does nothing else; it exists to read cells from inside an
//! effect without making the effect depend on them.
//!
//! [`scope`] additionally hands the closure a [`Scope`], a disposable group
//! of cleanups. Effects created through the scope register their disposers
//! in it, so one `dispose()` tears down everything the scope built. When a
//! scope is opened inside a running effect, that effect's next rerun or its
//! disposal also disposes the scope.

use std::cell::RefCell;
use std::fmt;
use std::panic;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::effect::{effect_with, Cleanup, Effect, IntoCleanup};
use super::runtime::Runtime;

/// Run `f` without tracking any cell it reads.
pub fn ignore<R>(f: impl FnOnce() -> R) -> R {
    let _untracked = ReactiveContext::untracked();
    f()
}

/// Run `f` untracked, giving it a [`Scope`] to collect cleanups in.
///
/// # Example
///
/// ```rust
/// use rill_core::reactive::{flush, scope, signal};
///
/// let (count, set_count) = signal(0);
/// let handle = scope(|s| {
///     let count = count.clone();
///     s.effect(move || println!("count is {}", count.get()));
///     s.clone()
/// });
///
/// handle.dispose();
/// set_count.set(1);
/// flush().unwrap(); // the effect was disposed with the scope
/// ```
pub fn scope<R>(f: impl FnOnce(&Scope) -> R) -> R {
    let scope = Scope::new();

    if let Some(outer) = ReactiveContext::current() {
        let bridged = scope.clone();
        let bridge = Cleanup::new(move || bridged.dispose());
        if let Err(bridge) = Runtime::with(|rt| rt.push_cleanup(outer, bridge)) {
            drop(bridge);
        }
    }

    let _untracked = ReactiveContext::untracked();
    f(&scope)
}

/// A disposable group of cleanups.
///
/// Clones share the same list.
#[derive(Clone, Default)]
pub struct Scope {
    cleanups: Rc<RefCell<Vec<Cleanup>>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` to run when the scope is disposed.
    pub fn on_cleanup<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        self.cleanups.borrow_mut().push(Cleanup::new(f));
    }

    /// Create an effect owned by this scope.
    pub fn effect<F, C>(&self, f: F) -> Effect
    where
        F: FnMut() -> C + 'static,
        C: IntoCleanup,
    {
        self.effect_with(f, true)
    }

    /// Create an effect owned by this scope, optionally skipping the first run.
    pub fn effect_with<F, C>(&self, f: F, init_run: bool) -> Effect
    where
        F: FnMut() -> C + 'static,
        C: IntoCleanup,
    {
        let effect = effect_with(f, init_run);
        self.on_cleanup(move || effect.dispose());
        effect
    }

    /// Run and clear every registered cleanup, in registration order.
    ///
    /// Calling this again runs only cleanups registered since the last call.
    pub fn dispose(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        if cleanups.is_empty() {
            return;
        }
        tracing::debug!(cleanups = cleanups.len(), "scope disposed");
        if let Err(payload) = Cleanup::run_all(cleanups) {
            panic::resume_unwind(payload);
        }
    }

    /// Number of cleanups waiting for `dispose`.
    pub fn pending_cleanups(&self) -> usize {
        self.cleanups.borrow().len()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("pending_cleanups", &self.pending_cleanups())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, flush, signal};
    use std::cell::Cell;

    #[test]
    fn ignore_reads_without_tracking() {
        let (tracked, set_tracked) = signal(1);
        let (ignored, set_ignored) = signal(10);
        let sums = Rc::new(RefCell::new(Vec::new()));
        let log = sums.clone();

        let watcher = effect(move || {
            let sum = tracked.get() + ignore(|| ignored.get());
            log.borrow_mut().push(sum);
        });
        assert_eq!(watcher.dependency_count(), 1);

        set_ignored.set(20);
        flush().unwrap();
        assert_eq!(*sums.borrow(), vec![11]);

        set_tracked.set(2);
        flush().unwrap();
        assert_eq!(*sums.borrow(), vec![11, 22]);
    }

    #[test]
    fn ignore_restores_tracking_afterwards() {
        let (a, set_a) = signal(0);
        let (b, _set_b) = signal(0);
        let watcher = effect(move || {
            ignore(|| b.get());
            a.get();
        });

        assert_eq!(watcher.dependency_count(), 1);
        set_a.set(1);
        flush().unwrap();
        assert_eq!(watcher.run_count(), 2);
    }

    #[test]
    fn dispose_is_idempotent() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();

        scope(|s| {
            s.on_cleanup(move || counter.set(counter.get() + 1));
            assert_eq!(s.pending_cleanups(), 1);
            s.dispose();
            s.dispose();
            assert_eq!(s.pending_cleanups(), 0);
        });

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn scope_owned_effects_stop_on_dispose() {
        let (count, set_count) = signal(0);
        let runs = Rc::new(Cell::new(0));

        let counter = runs.clone();
        let handle = scope(|s| {
            let count = count.clone();
            s.effect(move || {
                count.get();
                counter.set(counter.get() + 1);
            });
            s.clone()
        });

        set_count.set(1);
        flush().unwrap();
        assert_eq!(runs.get(), 2);

        handle.dispose();
        assert_eq!(count.subscriber_count(), 0);

        set_count.set(2);
        flush().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn scope_suspends_outer_tracking() {
        let (outer_read, _set_outer) = signal(0);
        let (inside_read, _set_inside) = signal(0);
        let inside = inside_read.clone();

        let watcher = effect(move || {
            outer_read.get();
            scope(|_| inside.get());
        });

        assert_eq!(watcher.dependency_count(), 1);
        assert_eq!(inside_read.subscriber_count(), 0);
    }

    #[test]
    fn scope_inside_effect_is_disposed_with_effect() {
        let (trigger, set_trigger) = signal(0);
        let disposed = Rc::new(Cell::new(0));

        let counter = disposed.clone();
        let watcher = effect(move || {
            trigger.get();
            let counter = counter.clone();
            scope(move |s| s.on_cleanup(move || counter.set(counter.get() + 1)));
        });
        assert_eq!(disposed.get(), 0);

        // A rerun runs the previous run's cleanups, including the bridge.
        set_trigger.set(1);
        flush().unwrap();
        assert_eq!(disposed.get(), 1);

        watcher.dispose();
        assert_eq!(disposed.get(), 2);
    }

    #[test]
    fn panicking_cleanup_still_disposes_owned_effects() {
        let (count, set_count) = signal(0);
        let runs = Rc::new(Cell::new(0));

        let counter = runs.clone();
        let handle = scope(|s| {
            s.on_cleanup(|| panic!("scope cleanup"));
            let count = count.clone();
            s.effect(move || {
                count.get();
                counter.set(counter.get() + 1);
            });
            s.clone()
        });

        assert!(panic::catch_unwind(panic::AssertUnwindSafe(|| handle.dispose())).is_err());
        assert_eq!(handle.pending_cleanups(), 0);
        assert_eq!(count.subscriber_count(), 0);

        set_count.set(1);
        flush().unwrap();
        assert_eq!(runs.get(), 1);
    }
}
