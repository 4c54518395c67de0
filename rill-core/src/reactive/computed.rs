//! Computed Implementation
//!
//! A Computed is a read-only derived value with a cache.
//!
//! # How Computeds Work
//!
//! 1. On creation, an internal effect runs the computation once. That run
//!    establishes the dependencies and its result fills the cache.
//!
//! 2. When a dependency changes, the internal effect is scheduled like any
//!    other. Its rerun marks the cache dirty, recomputes, stores the result
//!    and marks the cache clean again.
//!
//! 3. Reading a clean cache returns it without calling the computation. A
//!    dirty cache (left behind when a rerun panicked) is recomputed on read
//!    with tracking suspended, so the reader never depends on the internal
//!    effect.
//!
//! 4. Reading from inside an effect subscribes that effect to the cells the
//!    computation depends on. The reader then reruns when those cells change.
//!
//! The internal effect is queued in insertion order like everything else, so
//! a reader queued ahead of it within a batch may see the previous value.
//!
//! The cache holds an `Rc<T>` that readers clone out before running their
//! closure. A reader may therefore write a dependency and flush while it
//! still holds the old value.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::context::ReactiveContext;
use super::effect::Effect;
use super::runtime::Runtime;
use super::scope::ignore;

struct ComputedState<T> {
    cache: RefCell<Option<Rc<T>>>,
    dirty: Cell<bool>,
}

struct ComputedInner<T> {
    compute: Rc<dyn Fn() -> T>,
    state: Rc<ComputedState<T>>,
    effect: Effect,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.dispose();
    }
}

/// A cached value derived from other reactive cells.
///
/// # Example
///
/// ```rust
/// use rill_core::reactive::{computed, flush, signal};
///
/// let (a, set_a) = signal(2);
/// let (b, _set_b) = signal(3);
/// let sum = computed(move || a.get() + b.get());
/// assert_eq!(sum.get(), 5);
///
/// set_a.set(10);
/// flush().unwrap();
/// assert_eq!(sum.get(), 13);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: 'static> Computed<T> {
    /// Create a computed value. The computation runs once immediately.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let compute: Rc<dyn Fn() -> T> = Rc::new(compute);
        let state = Rc::new(ComputedState {
            cache: RefCell::new(None),
            dirty: Cell::new(true),
        });

        let tracked = Rc::clone(&compute);
        let target = Rc::clone(&state);
        let effect = Effect::new(move || {
            target.dirty.set(true);
            let value = Rc::new(tracked());
            let previous = target.cache.replace(Some(value));
            target.dirty.set(false);
            drop(previous);
        });

        Self {
            inner: Rc::new(ComputedInner {
                compute,
                state,
                effect,
            }),
        }
    }

    /// Get the current value, recomputing only if the cache is stale.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, recomputing only if the cache is stale.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if let Some(reader) = ReactiveContext::current() {
            Runtime::with(|rt| rt.adopt_dependencies(self.inner.effect.id(), reader));
        }

        let cached = if self.inner.state.dirty.get() {
            None
        } else {
            self.inner.state.cache.borrow().clone()
        };
        if let Some(value) = cached {
            return f(&*value);
        }

        tracing::trace!(effect = ?self.inner.effect.id(), "recomputing stale computed");
        let value = Rc::new(ignore(|| (self.inner.compute)()));
        let previous = self.inner.state.cache.replace(Some(Rc::clone(&value)));
        self.inner.state.dirty.set(false);
        drop(previous);
        f(&*value)
    }

    /// Whether the next read has to recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.state.dirty.get() || self.inner.state.cache.borrow().is_none()
    }
}

/// Create a computed value from `compute`.
pub fn computed<T, F>(compute: F) -> Computed<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(compute)
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("effect", &self.inner.effect.id())
            .field("dirty", &self.is_dirty())
            .field("cache", &self.inner.state.cache.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, flush, signal};
    use std::cell::RefCell;

    fn counted<T: 'static>(calls: &Rc<Cell<usize>>, f: impl Fn() -> T + 'static) -> impl Fn() -> T {
        let calls = calls.clone();
        move || {
            calls.set(calls.get() + 1);
            f()
        }
    }

    #[test]
    fn computes_once_on_creation_and_caches() {
        let calls = Rc::new(Cell::new(0));
        let answer = computed(counted(&calls, || 42));

        assert_eq!(calls.get(), 1);
        assert!(!answer.is_dirty());

        assert_eq!(answer.get(), 42);
        assert_eq!(answer.get(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn recomputes_after_dependency_change() {
        let calls = Rc::new(Cell::new(0));
        let (base, set_base) = signal(5);
        let doubled = computed(counted(&calls, move || base.get() * 2));
        assert_eq!(doubled.get(), 10);

        set_base.set(10);
        // Not yet flushed: the cache is still the old value.
        assert_eq!(doubled.get(), 10);

        flush().unwrap();
        assert_eq!(doubled.get(), 20);
        assert_eq!(doubled.get(), 20);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn several_changes_in_one_batch_invalidate_once() {
        let calls = Rc::new(Cell::new(0));
        let (a, set_a) = signal(1);
        let (b, set_b) = signal(2);
        let (c, set_c) = signal(3);
        let sum = computed(counted(&calls, move || a.get() + b.get() + c.get()));

        set_a.set(10);
        set_b.set(20);
        set_c.set(30);
        flush().unwrap();

        assert_eq!(sum.get(), 60);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn computed_of_computed_settles_over_passes() {
        let (base, set_base) = signal(1);
        let doubled = computed(move || base.get() * 2);
        let inner = doubled.clone();
        let plus_ten = computed(move || inner.get() + 10);
        assert_eq!(plus_ten.get(), 12);

        set_base.set(5);
        flush().unwrap();

        assert_eq!(doubled.get(), 10);
        assert_eq!(plus_ten.get(), 20);
    }

    #[test]
    fn outer_effect_tracks_underlying_cells() {
        let (a, set_a) = signal(2);
        let (b, _set_b) = signal(3);
        let sum = computed(move || a.get() + b.get());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let reader = sum.clone();
        let watcher = effect(move || log.borrow_mut().push(reader.get()));
        assert_eq!(watcher.dependency_count(), 2);

        set_a.set(10);
        flush().unwrap();

        assert_eq!(*seen.borrow(), vec![5, 13]);
    }

    #[test]
    fn failed_rerun_leaves_cache_dirty() {
        let (value, set_value) = signal(1);
        let checked = computed(move || {
            let v = value.get();
            assert!(v < 100, "value out of range");
            v
        });

        set_value.set(500);
        let err = flush().unwrap_err();
        assert_eq!(err.failures().len(), 1);
        assert!(checked.is_dirty());

        set_value.set(7);
        flush().unwrap();
        assert!(!checked.is_dirty());
        assert_eq!(checked.get(), 7);
    }

    #[test]
    fn dropping_last_handle_disposes_tracking() {
        let (base, _set_base) = signal(1);
        let probe = base.clone();
        let doubled = computed(move || base.get() * 2);
        assert_eq!(probe.subscriber_count(), 1);

        let other = doubled.clone();
        drop(doubled);
        assert_eq!(probe.subscriber_count(), 1);

        drop(other);
        assert_eq!(probe.subscriber_count(), 0);
    }

    #[test]
    fn reader_may_write_and_flush_inside_with() {
        let (base, set_base) = signal(1);
        let doubled = computed(move || base.get() * 2);

        let seen = doubled.with(|value| {
            set_base.set(*value + 1);
            flush().unwrap();
            *value
        });

        assert_eq!(seen, 2);
        assert!(!doubled.is_dirty());
        assert_eq!(doubled.get(), 6);
    }
}
