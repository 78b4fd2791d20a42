//! # uplink-plugin
//!
//! Plugin engine for the Uplink upload client. Provides:
//!
//! - Plugin registration with conflict, dependency, and API-compatibility
//!   validation
//! - Hook dispatch under sequential, parallel, and parallel-merge modes
//!   with per-call timeout policies
//! - Per-plugin health scoring from rolling hook statistics
//! - Session-scoped call tracing for diagnostics
//!
//! The engine is purely in-process orchestration: it owns no wire protocol
//! and keeps no state across restarts.

pub mod builder;
pub mod conflict;
pub mod dependency;
pub mod health;
pub mod hooks;
pub mod manager;
pub mod plugin;
pub mod prelude;
pub mod registry;
pub mod trace;

pub use builder::PluginBuilder;
pub use hooks::definitions::{ExecutionMode, HookCallback, HookContext, HookPoint, MergeStrategy};
pub use hooks::dispatcher::HookDispatcher;
pub use manager::PluginManager;
pub use plugin::{HostContext, Plugin, PluginInfo};
pub use registry::{PluginRegistry, PluginState, PriorityTable};
