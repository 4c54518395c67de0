//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, effects,
//! computed values and the scheduler that batches their updates.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! while an effect is running, the signal registers that effect as a
//! subscriber. When the value changes, all subscribers are queued to rerun.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that reruns whenever one of the
//! signals it read last time changes. Its dependency set is rebuilt from
//! scratch on every run, so conditional reads are tracked exactly.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result and only recomputes
//! when one of its dependencies changes.
//!
//! ## Scheduler
//!
//! Writes never run effects synchronously. Every affected effect is queued
//! once, and the queue is drained by [`flush`] at the next deferred
//! checkpoint, in insertion order.
//!
//! # Implementation Notes
//!
//! The graph lives in a thread-local arena indexed by generation-checked
//! keys. A thread-local tracking context records the running effect; it is
//! only changed through a guard that restores the previous value on drop.

mod computed;
mod context;
mod effect;
mod equality;
mod node;
mod runtime;
mod scheduler;
mod scope;
mod signal;

pub use computed::{computed, Computed};
pub use context::ReactiveContext;
pub use effect::{effect, effect_with, on_cleanup, Cleanup, Effect, IntoCleanup};
pub use equality::SameValue;
pub use node::{CellId, EffectId};
pub use runtime::{configure, current_config, set_deferrer};
pub use scheduler::{flush, is_flush_pending, pending_jobs, Defer, ManualDefer, TokioLocalDefer};
pub use scope::{ignore, scope, Scope};
pub use signal::{signal, ReadSignal, Signal, WriteSignal};
