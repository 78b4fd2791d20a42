//! Prelude for convenient imports.

pub use async_trait::async_trait;

pub use uplink_core::config::EngineConfig;
pub use uplink_core::config::conflict::ResolutionStrategy;
pub use uplink_core::config::dispatch::{HookTimeout, TimeoutAction};
pub use uplink_core::events::{EventBus, EventKind, PluginEvent};
pub use uplink_core::version::{ApiCompatMode, ApiRequirement};
pub use uplink_core::{AppError, AppResult};

pub use crate::builder::PluginBuilder;
pub use crate::hooks::definitions::{
    ExecutionMode, HookCallback, HookContext, HookPoint, MergeStrategy,
};
pub use crate::manager::PluginManager;
pub use crate::plugin::{HostContext, Plugin, PluginInfo};
pub use crate::registry::PluginState;
