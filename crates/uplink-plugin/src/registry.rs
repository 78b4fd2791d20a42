//! Plugin registry — stores registered plugin instances and state tables.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;

use crate::hooks::definitions::{HookCallback, HookPoint};
use crate::plugin::{Plugin, PluginInfo};

/// Default priority for plugins without an explicit entry.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Lifecycle state of a registered plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Stored but not yet initialized.
    Pending,
    /// Participating in hook dispatch.
    Enabled,
    /// Deliberately excluded from dispatch.
    Disabled,
    /// `init` failed; retained for inspection but excluded from dispatch.
    Failed,
}

/// Name → priority mapping. Lower priority runs earlier in sequential
/// dispatch; unknown names get [`DEFAULT_PRIORITY`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityTable {
    entries: HashMap<String, i32>,
}

impl PriorityTable {
    /// Creates a table seeded with sensible defaults for well-known
    /// plugin names: logging runs first, UI last.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert("logger".to_string(), 10);
        entries.insert("analytics".to_string(), 200);
        entries.insert("ui".to_string(), 1000);
        Self { entries }
    }

    /// Returns the priority for a plugin name.
    pub fn get(&self, name: &str) -> i32 {
        self.entries.get(name).copied().unwrap_or(DEFAULT_PRIORITY)
    }

    /// Sets one plugin's priority.
    pub fn set(&mut self, name: impl Into<String>, priority: i32) {
        self.entries.insert(name.into(), priority);
    }

    /// Merges a batch of priorities into the table.
    pub fn merge(&mut self, priorities: HashMap<String, i32>) {
        self.entries.extend(priorities);
    }

    /// Removes a plugin's explicit entry.
    pub fn remove(&mut self, name: &str) {
        self.entries.remove(name);
    }
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A single handler scheduled for dispatch.
#[derive(Clone)]
pub struct DispatchTarget {
    /// Owning plugin name.
    pub plugin: String,
    /// The callback to invoke.
    pub callback: Arc<dyn HookCallback>,
    /// Whether the owning plugin's errors are caught and isolated.
    pub catch_errors: bool,
}

impl std::fmt::Debug for DispatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTarget")
            .field("plugin", &self.plugin)
            .finish()
    }
}

/// Listing entry combining descriptor metadata with registry state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSummary {
    /// Descriptor metadata.
    pub info: PluginInfo,
    /// Current lifecycle state.
    pub state: PluginState,
    /// Effective priority.
    pub priority: i32,
    /// Declared hook names.
    pub hooks: Vec<String>,
}

#[derive(Default)]
struct RegistryTables {
    plugins: HashMap<String, Arc<dyn Plugin>>,
    infos: HashMap<String, PluginInfo>,
    // Insertion order; sequential dispatch breaks priority ties with it.
    order: Vec<String>,
    states: HashMap<String, PluginState>,
    priorities: PriorityTable,
    disabled: HashSet<String>,
    configs: HashMap<String, Value>,
}

/// Registry of all registered plugins and their state tables.
#[derive(Default)]
pub struct PluginRegistry {
    tables: RwLock<RegistryTables>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry").finish()
    }
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(RegistryTables {
                priorities: PriorityTable::new(),
                ..Default::default()
            }),
        }
    }

    /// Stores a plugin in `pending` state.
    pub async fn insert(&self, plugin: Arc<dyn Plugin>, info: PluginInfo) {
        let mut tables = self.tables.write().await;
        let name = info.name.clone();
        info!(plugin = %name, version = %info.version, "Storing plugin");

        if !tables.order.contains(&name) {
            tables.order.push(name.clone());
        }
        tables.plugins.insert(name.clone(), plugin);
        tables.infos.insert(name.clone(), info);
        tables.states.insert(name, PluginState::Pending);
    }

    /// Removes a plugin from every table.
    pub async fn remove(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        let mut tables = self.tables.write().await;
        let plugin = tables.plugins.remove(name);
        tables.infos.remove(name);
        tables.order.retain(|n| n != name);
        tables.states.remove(name);
        tables.priorities.remove(name);
        tables.disabled.remove(name);
        tables.configs.remove(name);
        plugin
    }

    /// Gets a plugin by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.tables.read().await.plugins.get(name).cloned()
    }

    /// Gets a plugin's stored metadata.
    pub async fn info(&self, name: &str) -> Option<PluginInfo> {
        self.tables.read().await.infos.get(name).cloned()
    }

    /// Checks whether a plugin is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.tables.read().await.plugins.contains_key(name)
    }

    /// Returns plugin count.
    pub async fn count(&self) -> usize {
        self.tables.read().await.plugins.len()
    }

    /// Returns the set of registered names.
    pub async fn names(&self) -> HashSet<String> {
        self.tables.read().await.plugins.keys().cloned().collect()
    }

    /// Returns a plugin's lifecycle state.
    pub async fn state(&self, name: &str) -> Option<PluginState> {
        self.tables.read().await.states.get(name).copied()
    }

    /// Sets a plugin's lifecycle state.
    pub async fn set_state(&self, name: &str, state: PluginState) {
        let mut tables = self.tables.write().await;
        if let Some(entry) = tables.states.get_mut(name) {
            *entry = state;
        }
    }

    /// Adds a plugin to the disabled set.
    pub async fn mark_disabled(&self, name: &str) {
        self.tables.write().await.disabled.insert(name.to_string());
    }

    /// Removes a plugin from the disabled set.
    pub async fn clear_disabled(&self, name: &str) {
        self.tables.write().await.disabled.remove(name);
    }

    /// Checks whether a plugin is in the disabled set.
    pub async fn is_disabled(&self, name: &str) -> bool {
        self.tables.read().await.disabled.contains(name)
    }

    /// Returns whether a plugin participates in hook dispatch.
    pub async fn is_active(&self, name: &str) -> bool {
        let tables = self.tables.read().await;
        tables.states.get(name) == Some(&PluginState::Enabled)
            && !tables.disabled.contains(name)
    }

    /// Merges a batch of priorities into the table.
    pub async fn set_priorities(&self, priorities: HashMap<String, i32>) {
        self.tables.write().await.priorities.merge(priorities);
    }

    /// Returns a plugin's effective priority.
    pub async fn priority_of(&self, name: &str) -> i32 {
        self.tables.read().await.priorities.get(name)
    }

    /// Returns a plugin's stored configuration.
    pub async fn config(&self, name: &str) -> Option<Value> {
        self.tables.read().await.configs.get(name).cloned()
    }

    /// Stores a plugin's configuration.
    pub async fn set_config(&self, name: &str, config: Value) {
        self.tables
            .write()
            .await
            .configs
            .insert(name.to_string(), config);
    }

    /// Metadata and declared hook sets of every registered plugin, for
    /// conflict scanning.
    pub async fn infos_with_hooks(&self) -> Vec<(PluginInfo, HashSet<HookPoint>)> {
        let tables = self.tables.read().await;
        tables
            .order
            .iter()
            .filter_map(|name| {
                let info = tables.infos.get(name)?.clone();
                let hooks = tables
                    .plugins
                    .get(name)
                    .map(|p| p.hooks().keys().copied().collect())
                    .unwrap_or_default();
                Some((info, hooks))
            })
            .collect()
    }

    /// Lists all registered plugins, sorted by priority.
    pub async fn list(&self) -> Vec<PluginSummary> {
        let tables = self.tables.read().await;
        let mut summaries: Vec<PluginSummary> = tables
            .order
            .iter()
            .filter_map(|name| {
                let info = tables.infos.get(name)?.clone();
                let state = tables.states.get(name).copied()?;
                let hooks = tables
                    .plugins
                    .get(name)
                    .map(|p| {
                        let mut names: Vec<String> =
                            p.hooks().keys().map(|h| h.as_str().to_string()).collect();
                        names.sort();
                        names
                    })
                    .unwrap_or_default();
                Some(PluginSummary {
                    priority: tables.priorities.get(name),
                    info,
                    state,
                    hooks,
                })
            })
            .collect();
        summaries.sort_by_key(|s| s.priority);
        summaries
    }

    /// Builds the dispatch snapshot for a hook: enabled, non-disabled
    /// plugins that implement it, in priority order.
    ///
    /// The snapshot is taken up front so a handler that registers or
    /// unregisters plugins mid-call cannot corrupt the iteration.
    pub async fn snapshot(&self, hook: HookPoint) -> Vec<DispatchTarget> {
        let tables = self.tables.read().await;
        let mut entries: Vec<(i32, DispatchTarget)> = Vec::new();

        // Insertion order first; the stable sort keeps it for ties.
        for name in &tables.order {
            if tables.states.get(name) != Some(&PluginState::Enabled)
                || tables.disabled.contains(name)
            {
                continue;
            }
            let Some(plugin) = tables.plugins.get(name) else {
                continue;
            };
            if let Some(callback) = plugin.hooks().get(&hook) {
                let catch_errors = tables
                    .infos
                    .get(name)
                    .map(|info| info.catch_errors)
                    .unwrap_or(true);
                entries.push((
                    tables.priorities.get(name),
                    DispatchTarget {
                        plugin: name.clone(),
                        callback: callback.clone(),
                        catch_errors,
                    },
                ));
            }
        }

        entries.sort_by_key(|(priority, _)| *priority);
        entries.into_iter().map(|(_, target)| target).collect()
    }
}
