//! Hook point definitions and handler contracts.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use uplink_core::AppResult;

/// Enumeration of all extension points in the upload pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// Fired once when a plugin is registered or re-enabled.
    Init,
    /// Fired before an upload starts. Each handler may transform the file
    /// descriptor in turn.
    BeforeUpload,
    /// Fired before each chunk is transferred. Can modify the chunk request.
    BeforeChunkUpload,
    /// Fired after each chunk is transferred.
    AfterChunkUpload,
    /// Fired after an upload completes.
    AfterUpload,
    /// Fired when an upload error surfaces.
    OnError,
    /// Fired when an upload is paused.
    OnPause,
    /// Fired when an upload is resumed.
    OnResume,
    /// Fired when an upload is cancelled.
    OnCancel,
    /// Fired on every progress update.
    OnProgress,
    /// Fired when a retry attempt starts.
    OnRetryStart,
    /// Fired when a retry attempt succeeds.
    OnRetrySuccess,
    /// Fired when all retry attempts are exhausted.
    OnRetryFailed,
    /// Fired once when a plugin is unregistered.
    Cleanup,
}

impl HookPoint {
    /// Returns the string name of this hook point.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::BeforeUpload => "before_upload",
            Self::BeforeChunkUpload => "before_chunk_upload",
            Self::AfterChunkUpload => "after_chunk_upload",
            Self::AfterUpload => "after_upload",
            Self::OnError => "on_error",
            Self::OnPause => "on_pause",
            Self::OnResume => "on_resume",
            Self::OnCancel => "on_cancel",
            Self::OnProgress => "on_progress",
            Self::OnRetryStart => "on_retry_start",
            Self::OnRetrySuccess => "on_retry_success",
            Self::OnRetryFailed => "on_retry_failed",
            Self::Cleanup => "cleanup",
        }
    }

    /// All hook points, in pipeline order.
    pub fn all() -> &'static [HookPoint] {
        &[
            Self::Init,
            Self::BeforeUpload,
            Self::BeforeChunkUpload,
            Self::AfterChunkUpload,
            Self::AfterUpload,
            Self::OnError,
            Self::OnPause,
            Self::OnResume,
            Self::OnCancel,
            Self::OnProgress,
            Self::OnRetryStart,
            Self::OnRetrySuccess,
            Self::OnRetryFailed,
            Self::Cleanup,
        ]
    }

    /// Returns the execution mode used for this hook unless overridden.
    ///
    /// Value-threading hooks run sequentially; pure notifications fan out.
    pub fn default_mode(&self) -> ExecutionMode {
        match self {
            Self::Init | Self::BeforeUpload | Self::BeforeChunkUpload | Self::Cleanup => {
                ExecutionMode::Sequential
            }
            _ => ExecutionMode::Parallel,
        }
    }
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HookPoint {
    type Err = uplink_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| uplink_core::AppError::validation(format!("unknown hook name '{s}'")))
    }
}

/// How a hook's matching handlers are invoked and combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Handlers fold over the value in priority order (waterfall).
    Sequential,
    /// Handlers fan out concurrently; the value is not threaded.
    Parallel,
    /// Handlers fan out concurrently; results are merged as they complete.
    ParallelMerge,
}

/// How `parallel-merge` results are combined once all handlers settle.
#[derive(Clone)]
pub enum MergeStrategy {
    /// The final completed result wins.
    LastWins,
    /// Shallow merge of object results onto the initial object; later
    /// completions overwrite earlier keys.
    ObjectMerge,
    /// Array results are flattened onto the initial array; scalar results
    /// are pushed.
    ArrayConcat,
    /// Caller-supplied reducer over the full completion-ordered result set.
    Custom(Arc<dyn Fn(Value, Vec<Value>) -> Value + Send + Sync>),
}

impl std::fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LastWins => write!(f, "LastWins"),
            Self::ObjectMerge => write!(f, "ObjectMerge"),
            Self::ArrayConcat => write!(f, "ArrayConcat"),
            Self::Custom(_) => write!(f, "Custom(<reducer>)"),
        }
    }
}

/// Invocation context handed to a hook callback.
///
/// The context is passed by value; sequential dispatch threads each
/// handler's returned value into the next handler's `value`.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// The hook point being invoked.
    pub hook: HookPoint,
    /// The accumulated (sequential) or initial (parallel) value.
    pub value: Value,
    /// Extra positional arguments passed by the host pipeline.
    pub args: Vec<Value>,
}

impl HookContext {
    /// Creates a context with no extra arguments.
    pub fn new(hook: HookPoint, value: Value) -> Self {
        Self {
            hook,
            value,
            args: Vec::new(),
        }
    }

    /// Sets the extra arguments.
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }
}

/// A single hook callback supplied by a plugin.
///
/// Plugins implement any subset of hook points; presence is checked
/// explicitly before invocation.
#[async_trait]
pub trait HookCallback: Send + Sync {
    /// Runs the callback and returns the next value.
    ///
    /// Notification hooks may simply echo `ctx.value` back.
    async fn invoke(&self, ctx: HookContext) -> AppResult<Value>;
}

/// Sparse mapping from hook point to callback for one plugin.
pub type HookSet = HashMap<HookPoint, Arc<dyn HookCallback>>;
