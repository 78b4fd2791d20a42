//! Hook call tracing configuration.

use serde::{Deserialize, Serialize};

/// Trace recorder limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Whether hook call tracing is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum number of historical sessions retained.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Maximum calls recorded per session before a new session is started.
    #[serde(default = "default_max_calls_per_session")]
    pub max_calls_per_session: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_sessions: default_max_sessions(),
            max_calls_per_session: default_max_calls_per_session(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_sessions() -> usize {
    10
}

fn default_max_calls_per_session() -> usize {
    1_000
}
