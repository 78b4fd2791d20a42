//! Closure-based plugin construction for quick plugin creation.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use uplink_core::AppResult;
use uplink_core::version::{ApiCompatMode, ApiRequirement};

use crate::hooks::definitions::{HookCallback, HookContext, HookPoint, HookSet};
use crate::plugin::{HostContext, Plugin, PluginInfo};

type BoxedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type InstallFn = Arc<dyn Fn(&HostContext) -> BoxedFuture<AppResult<()>> + Send + Sync>;

/// A hook callback backed by a closure.
pub struct ClosureCallback {
    handler: Arc<dyn Fn(HookContext) -> BoxedFuture<AppResult<Value>> + Send + Sync>,
}

impl std::fmt::Debug for ClosureCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureCallback")
            .field("handler", &"<closure>")
            .finish()
    }
}

impl ClosureCallback {
    /// Wraps an async closure into an `Arc<dyn HookCallback>`.
    pub fn wrap<F, Fut>(handler: F) -> Arc<dyn HookCallback>
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<Value>> + Send + 'static,
    {
        Arc::new(Self {
            handler: Arc::new(move |ctx| Box::pin(handler(ctx)) as BoxedFuture<AppResult<Value>>),
        })
    }
}

#[async_trait]
impl HookCallback for ClosureCallback {
    async fn invoke(&self, ctx: HookContext) -> AppResult<Value> {
        (self.handler)(ctx).await
    }
}

/// Builder assembling a [`Plugin`] out of metadata and closures.
///
/// Intended for tests and small in-process plugins; larger plugins
/// implement the trait directly.
pub struct PluginBuilder {
    info: PluginInfo,
    hooks: HashMap<HookPoint, Arc<dyn HookCallback>>,
    install: Option<InstallFn>,
}

impl PluginBuilder {
    /// Starts a builder with the given name and version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: PluginInfo::new(name, version),
            hooks: HashMap::new(),
            install: None,
        }
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.info.description = description.into();
        self
    }

    /// Declares a dependency on another plugin.
    pub fn dependency(mut self, name: impl Into<String>) -> Self {
        self.info.dependencies.push(name.into());
        self
    }

    /// Declares the host-API requirement.
    pub fn api_requirement(mut self, version: impl Into<String>, mode: ApiCompatMode) -> Self {
        self.info.api_requirement = Some(ApiRequirement::new(version, mode));
        self
    }

    /// Opts out of per-handler error catching: this plugin's hook errors
    /// propagate out of a sequential chain instead of being isolated.
    pub fn propagate_errors(mut self) -> Self {
        self.info.catch_errors = false;
        self
    }

    /// Attaches a hook callback.
    pub fn hook<F, Fut>(mut self, point: HookPoint, handler: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<Value>> + Send + 'static,
    {
        self.hooks.insert(point, ClosureCallback::wrap(handler));
        self
    }

    /// Attaches an install capability.
    pub fn on_install<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(&HostContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.install = Some(Arc::new(move |host| {
            Box::pin(handler(host)) as BoxedFuture<AppResult<()>>
        }));
        self
    }

    /// Finalizes the plugin.
    pub fn build(self) -> Arc<dyn Plugin> {
        Arc::new(BuiltPlugin {
            info: self.info,
            hooks: self.hooks,
            install: self.install,
        })
    }
}

struct BuiltPlugin {
    info: PluginInfo,
    hooks: HashMap<HookPoint, Arc<dyn HookCallback>>,
    install: Option<InstallFn>,
}

impl std::fmt::Debug for BuiltPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltPlugin")
            .field("name", &self.info.name)
            .field("version", &self.info.version)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[async_trait]
impl Plugin for BuiltPlugin {
    fn info(&self) -> PluginInfo {
        self.info.clone()
    }

    async fn install(&self, host: &HostContext) -> AppResult<()> {
        match &self.install {
            Some(install) => install(host).await,
            None => Ok(()),
        }
    }

    fn hooks(&self) -> HookSet {
        self.hooks.clone()
    }
}
