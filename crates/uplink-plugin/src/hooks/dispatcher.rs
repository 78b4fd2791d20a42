//! Hook dispatcher — executes a hook across the active plugin set.
//!
//! Three execution modes:
//!
//! - `sequential`: handlers fold over the value in priority order; a failed
//!   handler is isolated and the chain continues, unless the active timeout
//!   policy's action is `abort`.
//! - `parallel`: handlers fan out with the same arguments; failures never
//!   abort siblings; the initial value is returned unchanged.
//! - `parallel-merge`: identical fan-out, but results are collected in
//!   completion order and merged per a per-hook strategy.
//!
//! Handlers run as spawned tasks. A handler whose timeout fires is not
//! killed: the chain moves on while the stale task runs to completion in
//! the background and its eventual result is discarded.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use uplink_core::config::dispatch::{DispatchConfig, HookTimeout, TimeoutAction};
use uplink_core::{AppError, AppResult};

use super::definitions::{ExecutionMode, HookContext, HookPoint, MergeStrategy};
use super::instrument::Instrumentation;
use crate::registry::DispatchTarget;
use crate::trace::value_type_tag;

/// A hook call currently awaiting its handler.
#[derive(Debug, Clone)]
struct InFlightCall {
    plugin: String,
    hook: HookPoint,
    started_at: DateTime<Utc>,
}

/// Executes hooks across priority-ordered plugin snapshots.
#[derive(Debug)]
pub struct HookDispatcher {
    config: DispatchConfig,
    modes: RwLock<HashMap<HookPoint, ExecutionMode>>,
    merge_strategies: RwLock<HashMap<HookPoint, MergeStrategy>>,
    timeout_overrides: RwLock<HashMap<HookPoint, HookTimeout>>,
    instrumentation: Instrumentation,
    // Explicit call bookkeeping: entries are removed when the call settles
    // or when the owning plugin unregisters.
    in_flight: Mutex<HashMap<Uuid, InFlightCall>>,
}

impl HookDispatcher {
    /// Creates a dispatcher with the given config and telemetry sinks.
    pub fn new(config: DispatchConfig, instrumentation: Instrumentation) -> Self {
        Self {
            config,
            modes: RwLock::new(HashMap::new()),
            merge_strategies: RwLock::new(HashMap::new()),
            timeout_overrides: RwLock::new(HashMap::new()),
            instrumentation,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the execution mode for a hook.
    pub fn set_execution_mode(&self, hook: HookPoint, mode: ExecutionMode) {
        self.modes
            .write()
            .expect("dispatch modes lock poisoned")
            .insert(hook, mode);
    }

    /// Sets the merge strategy used when `hook` runs in `parallel-merge`.
    pub fn set_merge_strategy(&self, hook: HookPoint, strategy: MergeStrategy) {
        self.merge_strategies
            .write()
            .expect("merge strategies lock poisoned")
            .insert(hook, strategy);
    }

    /// Overrides the timeout policy for a hook at runtime.
    pub fn set_timeout_policy(&self, hook: HookPoint, policy: HookTimeout) {
        self.timeout_overrides
            .write()
            .expect("timeout overrides lock poisoned")
            .insert(hook, policy);
    }

    /// Invokes a hook across a priority-sorted snapshot of handlers.
    ///
    /// Returns the final value: the folded result in sequential mode, the
    /// initial value in parallel mode, the merged result in parallel-merge.
    pub async fn invoke(
        &self,
        hook: HookPoint,
        initial: Value,
        targets: Vec<DispatchTarget>,
        args: Vec<Value>,
    ) -> AppResult<Value> {
        if targets.is_empty() {
            return Ok(initial);
        }

        let mode = self.mode_for(hook);
        debug!(hook = %hook, handlers = targets.len(), mode = ?mode, "Dispatching hook");

        match mode {
            ExecutionMode::Sequential => self.invoke_sequential(hook, initial, targets, args).await,
            ExecutionMode::Parallel => self.invoke_parallel(hook, initial, targets, args).await,
            ExecutionMode::ParallelMerge => {
                self.invoke_parallel_merge(hook, initial, targets, args).await
            }
        }
    }

    /// Invokes a single plugin's handler for a hook, propagating its error.
    ///
    /// Used by the manager for `init`/`cleanup`, where the caller must see
    /// the failure rather than have it isolated.
    pub async fn invoke_single(
        &self,
        hook: HookPoint,
        target: &DispatchTarget,
        initial: Value,
        args: Vec<Value>,
    ) -> AppResult<Value> {
        let ctx = HookContext::new(hook, initial).with_args(args);
        self.call_one(target, ctx).await
    }

    /// Drops in-flight bookkeeping for a plugin being unregistered.
    pub fn forget_plugin_calls(&self, plugin: &str) {
        let mut in_flight = self.in_flight.lock().expect("in-flight table lock poisoned");
        in_flight.retain(|_, call| call.plugin != plugin);
    }

    /// Number of calls currently awaiting a handler.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .expect("in-flight table lock poisoned")
            .len()
    }

    /// Snapshot of the calls currently awaiting a handler.
    pub fn in_flight_calls(&self) -> Vec<(String, HookPoint, DateTime<Utc>)> {
        self.in_flight
            .lock()
            .expect("in-flight table lock poisoned")
            .values()
            .map(|call| (call.plugin.clone(), call.hook, call.started_at))
            .collect()
    }

    async fn invoke_sequential(
        &self,
        hook: HookPoint,
        initial: Value,
        targets: Vec<DispatchTarget>,
        args: Vec<Value>,
    ) -> AppResult<Value> {
        let policy = self.policy_for(hook);
        let mut value = initial;

        for target in &targets {
            let ctx = HookContext::new(hook, value.clone()).with_args(args.clone());
            match self.call_one(target, ctx).await {
                Ok(next) => value = next,
                Err(err) => {
                    if policy.action == TimeoutAction::Abort || !target.catch_errors {
                        warn!(
                            hook = %hook,
                            plugin = %target.plugin,
                            error = %err,
                            "Hook chain aborted"
                        );
                        return Err(err);
                    }
                    // Isolated: the chain continues with the value the
                    // failing handler received.
                    warn!(
                        hook = %hook,
                        plugin = %target.plugin,
                        error = %err,
                        "Hook handler failed; continuing chain"
                    );
                }
            }
        }

        Ok(value)
    }

    async fn invoke_parallel(
        &self,
        hook: HookPoint,
        initial: Value,
        targets: Vec<DispatchTarget>,
        args: Vec<Value>,
    ) -> AppResult<Value> {
        let calls = targets.iter().map(|target| {
            let ctx = HookContext::new(hook, initial.clone()).with_args(args.clone());
            self.call_one(target, ctx)
        });

        // Failures are recorded per handler inside call_one; siblings are
        // never aborted.
        let results = futures::future::join_all(calls).await;
        let failures = results.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            debug!(hook = %hook, failures, "Parallel hook completed with isolated failures");
        }

        Ok(initial)
    }

    async fn invoke_parallel_merge(
        &self,
        hook: HookPoint,
        initial: Value,
        targets: Vec<DispatchTarget>,
        args: Vec<Value>,
    ) -> AppResult<Value> {
        let mut pending: FuturesUnordered<_> = targets
            .iter()
            .map(|target| {
                let ctx = HookContext::new(hook, initial.clone()).with_args(args.clone());
                self.call_one(target, ctx)
            })
            .collect();

        // Completion order, not priority order.
        let mut completed = Vec::new();
        while let Some(result) = pending.next().await {
            if let Ok(value) = result {
                completed.push(value);
            }
        }

        let strategy = self.merge_strategy_for(hook);
        Ok(merge_results(hook, &strategy, initial, completed))
    }

    /// Runs one handler with instrumentation and the hook's timeout policy.
    async fn call_one(&self, target: &DispatchTarget, ctx: HookContext) -> AppResult<Value> {
        let hook = ctx.hook;
        let policy = self.policy_for(hook);
        let timeout = Duration::from_millis(policy.timeout_ms);
        let value_type = value_type_tag(&ctx.value);
        let arg_types: Vec<&'static str> = ctx.args.iter().map(value_type_tag).collect();

        let call_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        self.instrumentation.before(&target.plugin, hook);
        {
            let mut in_flight = self.in_flight.lock().expect("in-flight table lock poisoned");
            in_flight.insert(
                call_id,
                InFlightCall {
                    plugin: target.plugin.clone(),
                    hook,
                    started_at,
                },
            );
        }

        let callback = target.callback.clone();
        let mut task = tokio::spawn(async move { callback.invoke(ctx).await });

        let result: AppResult<Value> = match policy.action {
            TimeoutAction::Ignore => flatten_join(task.await, &target.plugin, hook),
            TimeoutAction::Warn => match tokio::time::timeout(timeout, &mut task).await {
                Ok(join) => flatten_join(join, &target.plugin, hook),
                Err(_) => {
                    warn!(
                        hook = %hook,
                        plugin = %target.plugin,
                        timeout_ms = policy.timeout_ms,
                        "Hook handler exceeded its timeout; still waiting"
                    );
                    // The eventual result is still honored.
                    flatten_join(task.await, &target.plugin, hook)
                }
            },
            TimeoutAction::Error | TimeoutAction::Abort => {
                match tokio::time::timeout(timeout, task).await {
                    Ok(join) => flatten_join(join, &target.plugin, hook),
                    // Dropping the join handle detaches the task: the
                    // handler may still run to completion in the background
                    // with its result discarded.
                    Err(_) => Err(AppError::timeout(format!(
                        "hook '{hook}' handler in plugin '{}' timed out after {}ms",
                        target.plugin, policy.timeout_ms
                    ))),
                }
            }
        };

        let duration = started.elapsed();
        {
            let mut in_flight = self.in_flight.lock().expect("in-flight table lock poisoned");
            in_flight.remove(&call_id);
        }

        self.instrumentation.settled(
            &target.plugin,
            hook,
            started_at,
            duration,
            value_type,
            arg_types,
            &result,
        );

        result
    }

    fn mode_for(&self, hook: HookPoint) -> ExecutionMode {
        self.modes
            .read()
            .expect("dispatch modes lock poisoned")
            .get(&hook)
            .copied()
            .unwrap_or_else(|| hook.default_mode())
    }

    fn merge_strategy_for(&self, hook: HookPoint) -> MergeStrategy {
        self.merge_strategies
            .read()
            .expect("merge strategies lock poisoned")
            .get(&hook)
            .cloned()
            .unwrap_or(MergeStrategy::LastWins)
    }

    fn policy_for(&self, hook: HookPoint) -> HookTimeout {
        if let Some(policy) = self
            .timeout_overrides
            .read()
            .expect("timeout overrides lock poisoned")
            .get(&hook)
        {
            return policy.clone();
        }
        if let Some(policy) = self.config.hook_timeouts.get(hook.as_str()) {
            return policy.clone();
        }
        HookTimeout {
            timeout_ms: self.config.default_timeout_ms,
            action: TimeoutAction::default(),
        }
    }
}

fn flatten_join(
    join: Result<AppResult<Value>, tokio::task::JoinError>,
    plugin: &str,
    hook: HookPoint,
) -> AppResult<Value> {
    match join {
        Ok(result) => result.map_err(|err| {
            AppError::with_source(
                uplink_core::error::ErrorKind::Plugin,
                format!("hook '{hook}' handler in plugin '{plugin}' failed"),
                err,
            )
        }),
        Err(join_err) => Err(AppError::plugin(format!(
            "hook '{hook}' handler in plugin '{plugin}' panicked: {join_err}"
        ))),
    }
}

/// Applies a merge strategy to completion-ordered results.
///
/// When the initial value's shape does not match the strategy's
/// expectations, merging falls back to last-wins.
fn merge_results(
    hook: HookPoint,
    strategy: &MergeStrategy,
    initial: Value,
    results: Vec<Value>,
) -> Value {
    match strategy {
        MergeStrategy::LastWins => last_wins(initial, results),
        MergeStrategy::ObjectMerge => match initial {
            Value::Object(mut base) => {
                for result in results {
                    match result {
                        Value::Object(map) => base.extend(map),
                        other => {
                            debug!(
                                hook = %hook,
                                result_type = value_type_tag(&other),
                                "Skipping non-object result in object-merge"
                            );
                        }
                    }
                }
                Value::Object(base)
            }
            other => {
                debug!(hook = %hook, "Initial value is not an object; falling back to last-wins");
                last_wins(other, results)
            }
        },
        MergeStrategy::ArrayConcat => match initial {
            Value::Array(mut base) => {
                for result in results {
                    match result {
                        Value::Array(items) => base.extend(items),
                        other => base.push(other),
                    }
                }
                Value::Array(base)
            }
            other => {
                debug!(hook = %hook, "Initial value is not an array; falling back to last-wins");
                last_wins(other, results)
            }
        },
        MergeStrategy::Custom(reducer) => reducer(initial, results),
    }
}

fn last_wins(initial: Value, results: Vec<Value>) -> Value {
    results.into_iter().next_back().unwrap_or(initial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_merge_extends_initial() {
        let merged = merge_results(
            HookPoint::BeforeUpload,
            &MergeStrategy::ObjectMerge,
            serde_json::json!({"a": 1}),
            vec![serde_json::json!({"b": 2}), serde_json::json!({"c": 3})],
        );
        assert_eq!(merged, serde_json::json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn test_object_merge_falls_back_on_shape_mismatch() {
        let merged = merge_results(
            HookPoint::BeforeUpload,
            &MergeStrategy::ObjectMerge,
            serde_json::json!(1),
            vec![serde_json::json!(2), serde_json::json!(3)],
        );
        assert_eq!(merged, serde_json::json!(3));
    }

    #[test]
    fn test_array_concat_flattens_and_pushes() {
        let merged = merge_results(
            HookPoint::OnProgress,
            &MergeStrategy::ArrayConcat,
            serde_json::json!([1]),
            vec![serde_json::json!([2, 3]), serde_json::json!("x")],
        );
        assert_eq!(merged, serde_json::json!([1, 2, 3, "x"]));
    }

    #[test]
    fn test_last_wins_empty_results_returns_initial() {
        let merged = merge_results(
            HookPoint::OnProgress,
            &MergeStrategy::LastWins,
            serde_json::json!({"seed": true}),
            Vec::new(),
        );
        assert_eq!(merged, serde_json::json!({"seed": true}));
    }

    #[test]
    fn test_custom_reducer() {
        let strategy = MergeStrategy::Custom(std::sync::Arc::new(|initial, results| {
            serde_json::json!({
                "initial": initial,
                "count": results.len(),
            })
        }));
        let merged = merge_results(
            HookPoint::OnProgress,
            &strategy,
            serde_json::json!(0),
            vec![serde_json::json!(1), serde_json::json!(2)],
        );
        assert_eq!(merged, serde_json::json!({"initial": 0, "count": 2}));
    }
}
