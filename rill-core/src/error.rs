//! Error Types
//!
//! User callbacks report failure by panicking. The core itself never fails on
//! misuse, so the only errors surfaced here are panics caught while flushing
//! scheduled effects and malformed configuration documents.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::reactive::EffectId;

/// Errors produced by the reactive runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// One or more scheduled effect reruns panicked during a flush.
    #[error("{} effect(s) panicked during flush: {}", .0.len(), summarize(.0))]
    EffectsPanicked(Vec<EffectFailure>),

    /// A runtime configuration document could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// The individual effect failures, if this error came from a flush.
    pub fn failures(&self) -> &[EffectFailure] {
        match self {
            Error::EffectsPanicked(failures) => failures,
            Error::Config(_) => &[],
        }
    }
}

/// A single effect rerun that panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectFailure {
    /// The effect whose body (or cleanup) panicked.
    pub effect: EffectId,
    /// The panic message, when the payload was a string.
    pub message: String,
}

impl EffectFailure {
    pub(crate) fn from_panic(effect: EffectId, payload: Box<dyn Any + Send>) -> Self {
        Self {
            effect,
            message: panic_message(payload.as_ref()),
        }
    }
}

impl fmt::Display for EffectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect {:?} panicked: {}", self.effect, self.message)
    }
}

fn summarize(failures: &[EffectFailure]) -> String {
    failures
        .iter()
        .map(|failure| failure.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let payload = panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload = panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");

        let payload = panic::catch_unwind(|| panic::panic_any(7_u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "<non-string panic payload>");
    }

    #[test]
    fn config_errors_have_no_failures() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(err.failures().is_empty());
        assert!(err.to_string().starts_with("invalid runtime configuration"));
    }
}
