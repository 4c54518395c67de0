//! Reactive Context
//!
//! The reactive context records which effect is currently running. This
//! enables automatic dependency tracking: when a cell is read, the runtime
//! links the cell to the current effect.
//!
//! # Implementation
//!
//! The context is a single thread-local slot. Entering a context saves the
//! previous occupant and installs a new one; the returned guard puts the
//! previous occupant back when dropped. Because restoration happens in
//! `Drop`, it also happens while unwinding out of a panicking body, so a
//! failing inner computation can never leave an outer one mis-tracked.
//!
//! Entering with `None` suspends tracking, which is how `ignore`, `scope`
//! and computed recomputation read cells without creating dependencies.

use std::cell::Cell;

use super::EffectId;

thread_local! {
    static CURRENT_EFFECT: Cell<Option<EffectId>> = const { Cell::new(None) };
}

/// Guard that restores the previous tracking context when dropped.
#[must_use = "the context is restored as soon as the guard is dropped"]
pub struct ReactiveContext {
    previous: Option<EffectId>,
}

impl ReactiveContext {
    /// Make `effect` the current tracking context until the guard drops.
    pub fn enter(effect: Option<EffectId>) -> Self {
        let previous = CURRENT_EFFECT.with(|current| current.replace(effect));
        Self { previous }
    }

    /// Suspend tracking until the guard drops.
    pub fn untracked() -> Self {
        Self::enter(None)
    }

    /// The effect currently being evaluated, if any.
    pub fn current() -> Option<EffectId> {
        CURRENT_EFFECT.with(Cell::get)
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        Self::current().is_some()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // Ignore failure during thread teardown.
        let _ = CURRENT_EFFECT.try_with(|current| current.set(self.previous));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::panic;

    fn ids(count: usize) -> Vec<EffectId> {
        let mut arena: SlotMap<EffectId, ()> = SlotMap::with_key();
        (0..count).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn context_tracks_effect() {
        let id = ids(1)[0];

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current().is_none());

        {
            let _ctx = ReactiveContext::enter(Some(id));

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn nested_contexts() {
        let ids = ids(2);

        {
            let _outer = ReactiveContext::enter(Some(ids[0]));
            assert_eq!(ReactiveContext::current(), Some(ids[0]));

            {
                let _inner = ReactiveContext::enter(Some(ids[1]));
                assert_eq!(ReactiveContext::current(), Some(ids[1]));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current(), Some(ids[0]));

            {
                let _suspended = ReactiveContext::untracked();
                assert!(!ReactiveContext::is_active());
            }

            assert_eq!(ReactiveContext::current(), Some(ids[0]));
        }

        assert!(ReactiveContext::current().is_none());
    }

    #[test]
    fn context_restored_when_body_panics() {
        let ids = ids(2);
        let _outer = ReactiveContext::enter(Some(ids[0]));

        let result = panic::catch_unwind(|| {
            let _inner = ReactiveContext::enter(Some(ids[1]));
            panic!("inner failure");
        });

        assert!(result.is_err());
        assert_eq!(ReactiveContext::current(), Some(ids[0]));
    }
}
