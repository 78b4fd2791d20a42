//! Plugin manager — top-level orchestration of the plugin engine.
//!
//! The manager is the only component the host interacts with directly. It
//! wires the registry, dependency manager, conflict resolver, health
//! monitor, trace recorder, and hook dispatcher together.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use uplink_core::config::EngineConfig;
use uplink_core::config::conflict::ResolutionStrategy;
use uplink_core::config::dispatch::HookTimeout;
use uplink_core::events::{ConfigEvent, EventBus, LifecycleEvent, PluginEvent};
use uplink_core::version::{is_compatible, parse_version};
use uplink_core::{AppError, AppResult};

use crate::conflict::{ConflictKind, ConflictResolver, Resolution};
use crate::dependency::DependencyManager;
use crate::health::{HealthMonitor, HealthRecord, PerformanceReport};
use crate::hooks::definitions::{ExecutionMode, HookPoint, MergeStrategy};
use crate::hooks::dispatcher::HookDispatcher;
use crate::hooks::instrument::Instrumentation;
use crate::plugin::{HostContext, Plugin};
use crate::registry::{DispatchTarget, PluginRegistry, PluginState, PluginSummary};
use crate::trace::{TraceAggregate, TraceQuery, TraceRecorder, TraceSession};

/// Orchestrates plugin registration, state, and hook dispatch.
pub struct PluginManager {
    config: EngineConfig,
    bus: Arc<EventBus>,
    registry: Arc<PluginRegistry>,
    dependencies: Arc<DependencyManager>,
    conflicts: Arc<ConflictResolver>,
    health: Arc<HealthMonitor>,
    trace: Arc<TraceRecorder>,
    dispatcher: Arc<HookDispatcher>,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("api_version", &self.config.host.api_version)
            .finish()
    }
}

impl PluginManager {
    /// Creates a manager with its own event bus.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_bus(config, Arc::new(EventBus::new()))
    }

    /// Creates a manager emitting on an externally owned event bus.
    pub fn with_bus(config: EngineConfig, bus: Arc<EventBus>) -> Self {
        let health = Arc::new(HealthMonitor::new(config.health.clone()));
        let trace = Arc::new(TraceRecorder::new(config.trace.clone()));
        let instrumentation = Instrumentation::new(bus.clone(), health.clone(), trace.clone());
        let dispatcher = Arc::new(HookDispatcher::new(config.dispatch.clone(), instrumentation));

        Self {
            registry: Arc::new(PluginRegistry::new()),
            dependencies: Arc::new(DependencyManager::new()),
            conflicts: Arc::new(ConflictResolver::new(config.conflict.default_strategy)),
            health,
            trace,
            dispatcher,
            bus,
            config,
        }
    }

    /// Registers a plugin.
    ///
    /// Runs conflict detection/resolution, the host-API compatibility
    /// check, the advisory functionality-overlap scan, and dependency
    /// validation; then stores the plugin, enables it, and runs its
    /// `install` capability and `init` hook. An `init` failure leaves the
    /// plugin retained in `failed` state and reports failure.
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> AppResult<()> {
        self.register_with_config(plugin, None).await
    }

    /// Registers a plugin with an initial configuration value.
    pub async fn register_with_config(
        &self,
        plugin: Arc<dyn Plugin>,
        plugin_config: Option<Value>,
    ) -> AppResult<()> {
        let info = plugin.info();
        parse_version(&info.version)?;
        let hook_set: HashSet<HookPoint> = plugin.hooks().keys().copied().collect();

        // Same-name conflicts are resolved first; overlap findings are
        // held back and logged after the compatibility check.
        let installed = self.registry.infos_with_hooks().await;
        let conflicts = self.conflicts.detect(&info, &hook_set, &installed);
        let mut advisory = Vec::new();

        for conflict in &conflicts {
            if conflict.kind != ConflictKind::Version {
                advisory.push(conflict);
                continue;
            }
            match self.conflicts.resolve(conflict)? {
                Resolution::RejectCandidate => {
                    return Err(AppError::conflict(format!(
                        "plugin '{}' v{} rejected: v{} stays installed",
                        info.name, info.version, conflict.installed.version
                    )));
                }
                Resolution::ReplaceInstalled => {
                    info!(
                        plugin = %info.name,
                        old = %conflict.installed.version,
                        new = %info.version,
                        "Replacing installed plugin with newer version"
                    );
                    self.unregister(&conflict.installed.name).await?;
                }
                Resolution::Coexist => {
                    // The registry is name-keyed; two plugins cannot share
                    // a name, so coexist degrades to keeping the incumbent.
                    warn!(
                        plugin = %info.name,
                        "Coexist resolution is impossible for a same-name conflict"
                    );
                    return Err(AppError::conflict(format!(
                        "plugin '{}' v{} rejected: coexist cannot apply to a same-name conflict",
                        info.name, info.version
                    )));
                }
            }
        }

        if let Some(requirement) = &info.api_requirement {
            if !is_compatible(&self.config.host.api_version, requirement)? {
                return Err(AppError::compatibility(format!(
                    "plugin '{}' requires host API {} ({:?} mode); host provides {}",
                    info.name,
                    requirement.version,
                    requirement.mode,
                    self.config.host.api_version
                )));
            }
        }

        for conflict in advisory {
            warn!(
                candidate = %conflict.candidate.name,
                installed = %conflict.installed.name,
                detail = %conflict.detail,
                "Functionality overlap detected; proceeding"
            );
        }

        let installed_names = self.registry.names().await;
        self.dependencies
            .register(&info.name, &info.dependencies, &installed_names)?;

        self.registry.insert(plugin.clone(), info.clone()).await;
        if let Some(value) = plugin_config {
            self.registry.set_config(&info.name, value).await;
        }
        self.registry
            .set_state(&info.name, PluginState::Enabled)
            .await;
        self.health.init_plugin(&info.name);
        self.bus.emit(&PluginEvent::Registered(LifecycleEvent::now(
            &info.name,
            &info.version,
        )));

        let host = HostContext {
            events: self.bus.clone(),
            api_version: self.config.host.api_version.clone(),
        };
        if let Err(err) = plugin.install(&host).await {
            return self.fail_startup(&info.name, "install", err).await;
        }
        if let Err(err) = self.run_own_hook(&plugin, &info.name, HookPoint::Init).await {
            return self.fail_startup(&info.name, "init", err).await;
        }

        info!(
            plugin = %info.name,
            version = %info.version,
            hooks = hook_set.len(),
            "Plugin registered"
        );
        Ok(())
    }

    /// Unregisters a plugin and removes it from every table.
    ///
    /// Fails without mutation while any other enabled plugin depends on it.
    pub async fn unregister(&self, name: &str) -> AppResult<()> {
        let plugin = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| AppError::not_found(format!("plugin '{name}' is not registered")))?;

        let blocking = self.active_dependents(name).await;
        if !blocking.is_empty() {
            return Err(AppError::dependency(format!(
                "cannot unregister '{name}': still required by enabled plugin(s): {}",
                blocking.join(", ")
            )));
        }

        let info = plugin.info();
        if let Err(err) = self.run_own_hook(&plugin, name, HookPoint::Cleanup).await {
            warn!(plugin = %name, error = %err, "Cleanup hook failed during unregister");
        }

        self.dispatcher.forget_plugin_calls(name);
        self.registry.remove(name).await;
        self.dependencies.remove(name);
        self.health.remove(name);
        self.bus.emit(&PluginEvent::Unregistered(LifecycleEvent::now(
            name,
            &info.version,
        )));

        info!(plugin = %name, "Plugin unregistered");
        Ok(())
    }

    /// Re-enables a plugin, re-running its `init` hook.
    pub async fn enable_plugin(&self, name: &str) -> AppResult<()> {
        let plugin = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| AppError::not_found(format!("plugin '{name}' is not registered")))?;

        if let Err(err) = self.run_own_hook(&plugin, name, HookPoint::Init).await {
            return self.fail_startup(name, "init", err).await;
        }

        self.registry.set_state(name, PluginState::Enabled).await;
        self.registry.clear_disabled(name).await;
        self.health.set_enabled(name, true);
        self.bus.emit(&PluginEvent::Enabled(LifecycleEvent::now(
            name,
            &plugin.info().version,
        )));
        Ok(())
    }

    /// Disables a plugin, excluding it from dispatch.
    ///
    /// Refused while enabled dependents exist.
    pub async fn disable_plugin(&self, name: &str) -> AppResult<()> {
        let plugin = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| AppError::not_found(format!("plugin '{name}' is not registered")))?;

        let blocking = self.active_dependents(name).await;
        if !blocking.is_empty() {
            return Err(AppError::dependency(format!(
                "cannot disable '{name}': still required by enabled plugin(s): {}",
                blocking.join(", ")
            )));
        }

        self.registry.set_state(name, PluginState::Disabled).await;
        self.registry.mark_disabled(name).await;
        self.health.set_enabled(name, false);
        self.bus.emit(&PluginEvent::Disabled(LifecycleEvent::now(
            name,
            &plugin.info().version,
        )));
        Ok(())
    }

    /// Returns a plugin's lifecycle state.
    pub async fn plugin_state(&self, name: &str) -> Option<PluginState> {
        self.registry.state(name).await
    }

    /// Returns a plugin's stored configuration.
    pub async fn plugin_config(&self, name: &str) -> Option<Value> {
        self.registry.config(name).await
    }

    /// Replaces a plugin's stored configuration.
    pub async fn update_plugin_config(&self, name: &str, value: Value) -> AppResult<()> {
        if !self.registry.contains(name).await {
            return Err(AppError::not_found(format!(
                "plugin '{name}' is not registered"
            )));
        }
        self.registry.set_config(name, value.clone()).await;
        self.bus.emit(&PluginEvent::ConfigUpdated(ConfigEvent {
            plugin: name.to_string(),
            config: value,
            at: chrono::Utc::now(),
        }));
        Ok(())
    }

    /// Merges a batch of priorities into the priority table.
    pub async fn set_priorities(&self, priorities: HashMap<String, i32>) {
        self.registry.set_priorities(priorities).await;
    }

    /// Invokes a hook across the active plugin set.
    ///
    /// This is the sole entry point the host pipeline uses at each of its
    /// fixed extension points. The active set is snapshotted and
    /// priority-sorted before dispatch.
    pub async fn invoke_hook(
        &self,
        hook: HookPoint,
        initial: Value,
        args: Vec<Value>,
    ) -> AppResult<Value> {
        let targets = self.registry.snapshot(hook).await;
        self.dispatcher.invoke(hook, initial, targets, args).await
    }

    /// Lists all registered plugins, sorted by priority.
    pub async fn list_plugins(&self) -> Vec<PluginSummary> {
        self.registry.list().await
    }

    /// Checks whether a plugin is registered.
    pub async fn has_plugin(&self, name: &str) -> bool {
        self.registry.contains(name).await
    }

    /// Returns the number of registered plugins.
    pub async fn plugin_count(&self) -> usize {
        self.registry.count().await
    }

    /// Returns one plugin's health record.
    pub fn plugin_health(&self, name: &str) -> Option<HealthRecord> {
        self.health.record(name)
    }

    /// Returns every plugin's health record.
    pub fn all_plugin_health(&self) -> HashMap<String, HealthRecord> {
        self.health.all()
    }

    /// Zeroes a plugin's health counters and restores `healthy`.
    pub fn reset_plugin_health(&self, name: &str) {
        self.health.reset(name);
    }

    /// Evicts health records untouched beyond the retention window.
    pub fn cleanup_expired_health(&self) -> usize {
        self.health.cleanup_expired()
    }

    /// Builds the aggregate performance report.
    pub fn performance_report(&self) -> PerformanceReport {
        self.health.report()
    }

    /// Returns the structured trace aggregate.
    pub fn trace_data(&self) -> TraceAggregate {
        self.trace.aggregate()
    }

    /// Renders the human-readable trace report.
    pub fn trace_report(&self) -> String {
        self.trace.report()
    }

    /// Queries recorded hook calls.
    pub fn trace_query(&self, query: &TraceQuery) -> Vec<crate::trace::HookCallRecord> {
        self.trace.query(query)
    }

    /// Returns a snapshot of the current trace session.
    pub fn current_trace_session(&self) -> TraceSession {
        self.trace.current_session()
    }

    /// Overrides the execution mode for a hook.
    pub fn set_execution_mode(&self, hook: HookPoint, mode: ExecutionMode) {
        self.dispatcher.set_execution_mode(hook, mode);
    }

    /// Sets the merge strategy for a hook running in `parallel-merge`.
    pub fn set_merge_strategy(&self, hook: HookPoint, strategy: MergeStrategy) {
        self.dispatcher.set_merge_strategy(hook, strategy);
    }

    /// Overrides the timeout policy for a hook.
    pub fn set_timeout_policy(&self, hook: HookPoint, policy: HookTimeout) {
        self.dispatcher.set_timeout_policy(hook, policy);
    }

    /// Sets a plugin-specific conflict resolution override.
    pub fn set_conflict_override(&self, plugin: &str, strategy: ResolutionStrategy) {
        self.conflicts.set_override(plugin, strategy);
    }

    /// Returns the event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Returns the hook dispatcher.
    pub fn dispatcher(&self) -> &Arc<HookDispatcher> {
        &self.dispatcher
    }

    async fn active_dependents(&self, name: &str) -> Vec<String> {
        let mut blocking = Vec::new();
        for dependent in self.dependencies.dependents(name) {
            if self.registry.is_active(&dependent).await {
                blocking.push(dependent);
            }
        }
        blocking
    }

    /// Runs one of the plugin's own lifecycle hooks (`init`/`cleanup`),
    /// propagating its error instead of isolating it.
    async fn run_own_hook(
        &self,
        plugin: &Arc<dyn Plugin>,
        name: &str,
        hook: HookPoint,
    ) -> AppResult<()> {
        if let Some(callback) = plugin.hooks().get(&hook) {
            let target = DispatchTarget {
                plugin: name.to_string(),
                callback: callback.clone(),
                catch_errors: true,
            };
            self.dispatcher
                .invoke_single(hook, &target, Value::Null, Vec::new())
                .await?;
        }
        Ok(())
    }

    async fn fail_startup(&self, name: &str, phase: &str, err: AppError) -> AppResult<()> {
        self.registry.set_state(name, PluginState::Failed).await;
        self.registry.mark_disabled(name).await;
        self.health.record_failure(name, &err.to_string());
        self.health.set_enabled(name, false);
        Err(AppError::plugin(format!(
            "plugin '{name}' {phase} failed: {err}"
        )))
    }
}
