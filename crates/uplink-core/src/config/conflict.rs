//! Conflict resolution configuration.

use serde::{Deserialize, Serialize};

/// Strategy applied when two plugin registrations conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// Keep whichever side has the higher semver version.
    UseLatest,
    /// Keep the already-installed plugin.
    UseInstalled,
    /// Refuse the registration outright.
    Forbid,
    /// Keep both plugins and log a warning.
    Coexist,
    /// Reserved for future descriptor merging.
    Merge,
}

impl Default for ResolutionStrategy {
    fn default() -> Self {
        Self::UseLatest
    }
}

/// Conflict resolution configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Global fallback strategy when neither the plugin nor the conflict
    /// itself selects one.
    #[serde(default)]
    pub default_strategy: ResolutionStrategy,
}
