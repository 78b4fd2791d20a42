//! Hook dispatch configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What the dispatcher does when a hook handler exceeds its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutAction {
    /// Log a warning; keep waiting and honor the result when it settles.
    Warn,
    /// Fail the affected call alone.
    Error,
    /// Fail the call and stop a sequential chain early.
    Abort,
    /// No special handling.
    Ignore,
}

impl Default for TimeoutAction {
    fn default() -> Self {
        Self::Warn
    }
}

/// Timeout policy for a single hook point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookTimeout {
    /// Timeout in milliseconds.
    pub timeout_ms: u64,
    /// Action taken when the timeout elapses.
    #[serde(default)]
    pub action: TimeoutAction,
}

/// Hook dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Default handler timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Per-hook timeout overrides, keyed by hook name (e.g. `before_upload`).
    #[serde(default)]
    pub hook_timeouts: HashMap<String, HookTimeout>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            hook_timeouts: HashMap::new(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}
