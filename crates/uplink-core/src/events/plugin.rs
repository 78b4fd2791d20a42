//! Typed plugin lifecycle and instrumentation events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminant used for event bus subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A plugin was registered.
    Registered,
    /// A plugin was unregistered.
    Unregistered,
    /// A plugin was enabled.
    Enabled,
    /// A plugin was disabled.
    Disabled,
    /// A plugin's configuration was updated.
    ConfigUpdated,
    /// A hook handler is about to run.
    HookBefore,
    /// A hook handler completed.
    HookAfter,
    /// A hook handler failed.
    HookError,
    /// Timing data for a completed hook handler call.
    HookPerformance,
}

/// A plugin lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Plugin name.
    pub plugin: String,
    /// Plugin version.
    pub version: String,
    /// When the transition occurred.
    pub at: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Creates a lifecycle event stamped with the current time.
    pub fn now(plugin: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            version: version.into(),
            at: Utc::now(),
        }
    }
}

/// A plugin configuration update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEvent {
    /// Plugin name.
    pub plugin: String,
    /// The new configuration value.
    pub config: serde_json::Value,
    /// When the update occurred.
    pub at: DateTime<Utc>,
}

/// A hook handler invocation boundary (before/after).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    /// Plugin name.
    pub plugin: String,
    /// Hook name.
    pub hook: String,
    /// When the boundary was crossed.
    pub at: DateTime<Utc>,
}

/// A hook handler failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookErrorEvent {
    /// Plugin name.
    pub plugin: String,
    /// Hook name.
    pub hook: String,
    /// Error message.
    pub error: String,
    /// Whether the failure was a timeout.
    pub timed_out: bool,
    /// When the failure was observed.
    pub at: DateTime<Utc>,
}

/// Timing data for a settled hook handler call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceEvent {
    /// Plugin name.
    pub plugin: String,
    /// Hook name.
    pub hook: String,
    /// Wall-clock duration of the call in milliseconds.
    pub duration_ms: u64,
    /// When the call settled.
    pub at: DateTime<Utc>,
}

/// Union of all events carried on the plugin event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum PluginEvent {
    /// A plugin was registered.
    Registered(LifecycleEvent),
    /// A plugin was unregistered.
    Unregistered(LifecycleEvent),
    /// A plugin was enabled.
    Enabled(LifecycleEvent),
    /// A plugin was disabled.
    Disabled(LifecycleEvent),
    /// A plugin's configuration was updated.
    ConfigUpdated(ConfigEvent),
    /// A hook handler is about to run.
    HookBefore(HookEvent),
    /// A hook handler completed.
    HookAfter(HookEvent),
    /// A hook handler failed.
    HookError(HookErrorEvent),
    /// Timing data for a completed hook handler call.
    HookPerformance(PerformanceEvent),
}

impl PluginEvent {
    /// Returns the subscription discriminant for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Registered(_) => EventKind::Registered,
            Self::Unregistered(_) => EventKind::Unregistered,
            Self::Enabled(_) => EventKind::Enabled,
            Self::Disabled(_) => EventKind::Disabled,
            Self::ConfigUpdated(_) => EventKind::ConfigUpdated,
            Self::HookBefore(_) => EventKind::HookBefore,
            Self::HookAfter(_) => EventKind::HookAfter,
            Self::HookError(_) => EventKind::HookError,
            Self::HookPerformance(_) => EventKind::HookPerformance,
        }
    }
}
