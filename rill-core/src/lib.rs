//! Rill Core
//!
//! This crate provides fine-grained reactive state management:
//!
//! - Reactive cells whose reads are tracked automatically
//! - Effects that rerun when the cells they read change
//! - Cached computed values derived from other cells
//! - A scheduler that coalesces all changes of one logical turn into a
//!   single batched flush
//!
//! The runtime is single-threaded. Each thread has its own dependency graph
//! and all handles are `!Send`.
//!
//! # Architecture
//!
//! - `reactive`: the primitives, the runtime arena and the scheduler
//! - `config`: per-thread runtime policy
//! - `error`: errors reported by flushes and configuration parsing
//!
//! # Example
//!
//! ```rust
//! use rill_core::reactive::{computed, effect, flush, signal};
//!
//! // Create a signal
//! let (count, set_count) = signal(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     computed(move || count.get() * 2)
//! };
//!
//! // Create an effect
//! let reader = doubled.clone();
//! let logger = effect(move || {
//!     println!("Count: {}, Doubled: {}", count.get(), reader.get());
//! });
//!
//! // Update the signal; the effect reruns at the next flush
//! set_count.set(5);
//! flush().unwrap();
//! // prints: "Count: 5, Doubled: 10"
//!
//! logger.dispose();
//! ```

pub mod config;
pub mod error;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{EffectFailure, Error, Result};

/// Alias for [`Error`].
pub use error::Error as ReactiveError;
