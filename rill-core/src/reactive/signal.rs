//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which effects depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while an effect is running, the signal and the
//!    effect are linked in the runtime graph.
//!
//! 2. When a signal is written with a value that differs from the current
//!    one, the new value is stored immediately and every linked effect is
//!    queued on the scheduler.
//!
//! 3. The queued effects rerun on the next flush, never synchronously inside
//!    the write.
//!
//! # Ownership
//!
//! The value lives behind an `Rc` shared by every handle to the signal; the
//! runtime arena only records graph edges. When the last handle is dropped
//! the arena node and all of its edges are removed.
//!
//! Each write stores a fresh `Rc<T>`. Readers clone that `Rc` out before
//! running their closure, so a closure may write the signal it is reading.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::context::ReactiveContext;
use super::equality::SameValue;
use super::node::CellId;
use super::runtime::Runtime;
use super::scheduler::schedule;

struct SignalInner<T> {
    id: CellId,
    value: RefCell<Rc<T>>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        tracing::trace!(cell = ?self.id, "signal dropped");
        Runtime::try_with(|rt| rt.remove_cell(self.id));
    }
}

/// A reactive cell holding a value of type `T`, readable and writable.
///
/// Cloning a signal yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use rill_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
///
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        let id = Runtime::with(Runtime::create_cell);
        Self {
            inner: Rc::new(SignalInner {
                id,
                value: RefCell::new(Rc::new(value)),
            }),
        }
    }

    /// Get the signal's arena id.
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    fn track(&self) {
        if let Some(effect) = ReactiveContext::current() {
            Runtime::with(|rt| rt.link(self.inner.id, effect));
        }
    }

    /// Get the current value, tracking it if an effect is running.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, tracking it if an effect is running.
    ///
    /// `f` sees the value as of the call, even if it writes the signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        self.with_untracked(f)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(T::clone)
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let current = self.snapshot();
        f(&*current)
    }

    fn snapshot(&self) -> Rc<T> {
        Rc::clone(&self.inner.value.borrow())
    }

    /// Store `value` unless it is the same value as the current one, then
    /// queue every subscriber for the next flush.
    pub fn set(&self, value: T)
    where
        T: SameValue,
    {
        self.set_with(value, T::same_value);
    }

    /// Update the value from the previous one.
    pub fn update(&self, f: impl FnOnce(&T) -> T)
    where
        T: SameValue,
    {
        self.update_with(f, T::same_value);
    }

    /// Like [`Signal::set`], with a custom equality test.
    pub fn set_with(&self, value: T, equals: impl Fn(&T, &T) -> bool) {
        let current = self.snapshot();
        if equals(&*current, &value) {
            return;
        }
        let previous = self.inner.value.replace(Rc::new(value));
        drop(previous);
        drop(current);
        self.notify();
    }

    /// Like [`Signal::update`], with a custom equality test.
    pub fn update_with(&self, f: impl FnOnce(&T) -> T, equals: impl Fn(&T, &T) -> bool) {
        let next = f(&*self.snapshot());
        self.set_with(next, equals);
    }

    /// Queue every current subscriber.
    fn notify(&self) {
        let subscribers = Runtime::with(|rt| rt.subscribers(self.inner.id));
        tracing::trace!(cell = ?self.inner.id, subscribers = subscribers.len(), "signal changed");
        for subscriber in subscribers {
            schedule(subscriber);
        }
    }

    /// Get the number of effects that read this signal on their latest run.
    pub fn subscriber_count(&self) -> usize {
        Runtime::with(|rt| rt.subscriber_count(self.inner.id))
    }

    /// A read-only handle to the same cell.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal(self.clone())
    }

    /// Split into separate read and write handles.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        (ReadSignal(self.clone()), WriteSignal(self))
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_untracked(|value| {
            f.debug_struct("Signal")
                .field("id", &self.inner.id)
                .field("value", value)
                .field("subscriber_count", &self.subscriber_count())
                .finish()
        })
    }
}

/// Create a reactive cell and return its getter and setter.
pub fn signal<T: 'static>(initial: T) -> (ReadSignal<T>, WriteSignal<T>) {
    Signal::new(initial).split()
}

/// The read half of a [`Signal`].
pub struct ReadSignal<T: 'static>(Signal<T>);

impl<T: 'static> ReadSignal<T> {
    pub fn id(&self) -> CellId {
        self.0.id()
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.0.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.0.with(f)
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.0.get_untracked()
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.0.with_untracked(f)
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subscriber_count()
    }
}

impl<T: 'static> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Debug + 'static> Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadSignal").field(&self.0).finish()
    }
}

/// The write half of a [`Signal`].
pub struct WriteSignal<T: 'static>(Signal<T>);

impl<T: 'static> WriteSignal<T> {
    pub fn id(&self) -> CellId {
        self.0.id()
    }

    pub fn set(&self, value: T)
    where
        T: SameValue,
    {
        self.0.set(value);
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T)
    where
        T: SameValue,
    {
        self.0.update(f);
    }

    pub fn set_with(&self, value: T, equals: impl Fn(&T, &T) -> bool) {
        self.0.set_with(value, equals);
    }

    pub fn update_with(&self, f: impl FnOnce(&T) -> T, equals: impl Fn(&T, &T) -> bool) {
        self.0.update_with(f, equals);
    }
}

impl<T: 'static> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: 'static> Debug for WriteSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriteSignal").field(&self.0.id()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
