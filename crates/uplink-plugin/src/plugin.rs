//! The contract every plugin supplies to the engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use uplink_core::AppResult;
use uplink_core::events::EventBus;
use uplink_core::version::ApiRequirement;

use crate::hooks::definitions::HookSet;

/// Metadata describing a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Unique plugin name.
    pub name: String,
    /// Plugin semver version string.
    pub version: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Names of plugins this plugin requires.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Declared host-API requirement, if any.
    #[serde(default)]
    pub api_requirement: Option<ApiRequirement>,
    /// Whether hook errors are caught and isolated (the default). A plugin
    /// that opts out has its handler errors propagate out of a sequential
    /// chain.
    #[serde(default = "default_catch_errors")]
    pub catch_errors: bool,
}

fn default_catch_errors() -> bool {
    true
}

impl PluginInfo {
    /// Creates minimal metadata with just a name and version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            dependencies: Vec::new(),
            api_requirement: None,
            catch_errors: true,
        }
    }
}

/// Host capabilities handed to a plugin's `install` hook.
///
/// Explicitly constructed and injected; plugins never reach for globals.
#[derive(Clone)]
pub struct HostContext {
    /// The plugin event bus.
    pub events: Arc<EventBus>,
    /// The host's own API version.
    pub api_version: String,
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Trait implemented by every Uplink plugin.
///
/// A plugin is a named, versioned unit supplying zero or more hook
/// callbacks plus optional dependency/compatibility metadata. The engine
/// holds a reference for the plugin's active lifetime, never a copy.
#[async_trait]
pub trait Plugin: Send + Sync + std::fmt::Debug {
    /// Returns plugin metadata.
    fn info(&self) -> PluginInfo;

    /// Called once during registration, after validation succeeds and
    /// before the `init` hook runs. Receives the host capability object.
    async fn install(&self, _host: &HostContext) -> AppResult<()> {
        Ok(())
    }

    /// Returns the sparse mapping of hook points this plugin implements.
    fn hooks(&self) -> HookSet;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_defaults() {
        let info = PluginInfo::new("logger", "1.0.0");
        assert!(info.dependencies.is_empty());
        assert!(info.api_requirement.is_none());
    }

    #[test]
    fn test_info_deserialize_sparse() {
        let info: PluginInfo =
            serde_json::from_str(r#"{"name":"x","version":"0.1.0"}"#).expect("deserialize");
        assert_eq!(info.name, "x");
        assert!(info.description.is_empty());
    }
}
