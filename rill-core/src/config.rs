//! Runtime Configuration
//!
//! The runtime has two policy knobs: how a flush reacts when an effect panics,
//! and how the scheduler arranges for the next flush to happen. Both default
//! to the conservative choice, so most programs never touch this module.
//!
//! Configuration is per thread, like the runtime itself. It can be built in
//! code or parsed from JSON:
//!
//! ```rust
//! use rill_core::config::{Deferral, ErrorPolicy, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_json(r#"{ "error_policy": "abort" }"#).unwrap();
//! assert_eq!(config.error_policy, ErrorPolicy::Abort);
//! assert_eq!(config.deferral, Deferral::Manual);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What a flush does when an effect rerun panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Keep running the remaining jobs and report every failure at the end.
    #[default]
    Isolate,
    /// Stop at the first failure. Jobs that did not run are re-queued.
    Abort,
}

/// How the scheduler arranges the deferred flush after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deferral {
    /// The host calls [`flush`](crate::reactive::flush) at the end of each
    /// unit of work.
    #[default]
    Manual,
    /// Spawn the flush on the current `tokio::task::LocalSet`. It runs once
    /// the current task yields, before tasks spawned after it.
    TokioLocal,
}

/// Per-thread runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub error_policy: ErrorPolicy,
    pub deferral: Deferral,
}

impl RuntimeConfig {
    /// Parse a configuration document. Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    pub fn with_deferral(mut self, deferral: Deferral) -> Self {
        self.deferral = deferral;
        self
    }
}
