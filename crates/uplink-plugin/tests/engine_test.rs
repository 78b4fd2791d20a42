//! End-to-end tests for the plugin engine: registration, validation,
//! dispatch modes, timeouts, health, and tracing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::{Value, json};

use uplink_core::error::ErrorKind;
use uplink_plugin::health::HealthStatus;
use uplink_plugin::prelude::*;

fn manager() -> PluginManager {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    PluginManager::new(EngineConfig::default())
}

/// Plugin whose `before_upload` handler appends its own name to the
/// `tags` array of the value it receives.
fn tagging_plugin(name: &str, version: &str) -> Arc<dyn Plugin> {
    let tag = name.to_string();
    PluginBuilder::new(name, version)
        .hook(HookPoint::BeforeUpload, move |ctx| {
            let tag = tag.clone();
            async move {
                let mut value = ctx.value;
                let map = value.as_object_mut().expect("object value");
                map.entry("tags".to_string())
                    .or_insert_with(|| json!([]))
                    .as_array_mut()
                    .expect("tags array")
                    .push(json!(tag));
                Ok(value)
            }
        })
        .build()
}

fn noop_plugin(name: &str, version: &str) -> Arc<dyn Plugin> {
    PluginBuilder::new(name, version).build()
}

#[tokio::test]
async fn sequential_dispatch_respects_priority_order() {
    let manager = manager();

    // Registered out of priority order on purpose.
    manager
        .register(tagging_plugin("b", "1.0.0"))
        .await
        .expect("register b");
    manager
        .register(tagging_plugin("a", "1.0.0"))
        .await
        .expect("register a");
    manager
        .set_priorities(HashMap::from([("a".to_string(), 5), ("b".to_string(), 10)]))
        .await;

    let out = manager
        .invoke_hook(HookPoint::BeforeUpload, json!({}), Vec::new())
        .await
        .expect("invoke");

    assert_eq!(out["tags"], json!(["a", "b"]));
}

#[tokio::test]
async fn sequential_ties_follow_registration_order() {
    let manager = manager();
    manager
        .register(tagging_plugin("first", "1.0.0"))
        .await
        .expect("register");
    manager
        .register(tagging_plugin("second", "1.0.0"))
        .await
        .expect("register");

    let out = manager
        .invoke_hook(HookPoint::BeforeUpload, json!({}), Vec::new())
        .await
        .expect("invoke");

    assert_eq!(out["tags"], json!(["first", "second"]));
}

#[tokio::test]
async fn duplicate_name_same_version_is_rejected() {
    let manager = manager();
    manager
        .register(noop_plugin("x", "1.0.0"))
        .await
        .expect("first registration");

    let err = manager
        .register(noop_plugin("x", "1.0.0"))
        .await
        .expect_err("second registration must fail");
    assert!(err.is_kind(ErrorKind::Conflict));
    assert_eq!(manager.plugin_count().await, 1);
}

#[tokio::test]
async fn newer_version_replaces_installed() {
    let manager = manager();
    manager
        .register(noop_plugin("x", "1.0.0"))
        .await
        .expect("v1");
    manager
        .register(noop_plugin("x", "2.0.0"))
        .await
        .expect("v2 replaces v1");

    assert_eq!(manager.plugin_count().await, 1);
    let listing = manager.list_plugins().await;
    assert_eq!(listing[0].info.version, "2.0.0");
}

#[tokio::test]
async fn older_version_is_rejected() {
    let manager = manager();
    manager
        .register(noop_plugin("x", "2.0.0"))
        .await
        .expect("v2");

    let err = manager
        .register(noop_plugin("x", "1.0.0"))
        .await
        .expect_err("older candidate must fail");
    assert!(err.is_kind(ErrorKind::Conflict));
    assert_eq!(manager.list_plugins().await[0].info.version, "2.0.0");
}

#[tokio::test]
async fn missing_dependency_blocks_registration() {
    let manager = manager();
    let err = manager
        .register(
            PluginBuilder::new("b", "1.0.0")
                .dependency("ghost")
                .build(),
        )
        .await
        .expect_err("missing dep");
    assert!(err.is_kind(ErrorKind::Dependency));
    assert!(!manager.has_plugin("b").await);
}

#[tokio::test]
async fn unregister_refused_while_enabled_dependent_exists() {
    let manager = manager();
    manager.register(noop_plugin("a", "1.0.0")).await.expect("a");
    manager
        .register(PluginBuilder::new("b", "1.0.0").dependency("a").build())
        .await
        .expect("b");

    let err = manager.unregister("a").await.expect_err("blocked");
    assert!(err.is_kind(ErrorKind::Dependency));
    assert!(manager.has_plugin("a").await);
    assert_eq!(manager.plugin_state("a").await, Some(PluginState::Enabled));

    // Once the dependent is gone, unregistration goes through.
    manager.unregister("b").await.expect("unregister b");
    manager.unregister("a").await.expect("unregister a");
    assert_eq!(manager.plugin_count().await, 0);
}

#[tokio::test]
async fn disable_refused_while_enabled_dependent_exists() {
    let manager = manager();
    manager.register(noop_plugin("a", "1.0.0")).await.expect("a");
    manager
        .register(PluginBuilder::new("b", "1.0.0").dependency("a").build())
        .await
        .expect("b");

    let err = manager.disable_plugin("a").await.expect_err("blocked");
    assert!(err.is_kind(ErrorKind::Dependency));

    manager.disable_plugin("b").await.expect("disable leaf");
    manager.disable_plugin("a").await.expect("now unblocked");
    assert_eq!(manager.plugin_state("a").await, Some(PluginState::Disabled));
}

#[tokio::test]
async fn disabled_plugin_is_skipped_by_dispatch() {
    let manager = manager();
    manager
        .register(tagging_plugin("a", "1.0.0"))
        .await
        .expect("a");
    manager
        .register(tagging_plugin("b", "1.0.0"))
        .await
        .expect("b");

    manager.disable_plugin("a").await.expect("disable a");
    let out = manager
        .invoke_hook(HookPoint::BeforeUpload, json!({}), Vec::new())
        .await
        .expect("invoke");
    assert_eq!(out["tags"], json!(["b"]));

    manager.enable_plugin("a").await.expect("enable a");
    let out = manager
        .invoke_hook(HookPoint::BeforeUpload, json!({}), Vec::new())
        .await
        .expect("invoke");
    assert_eq!(out["tags"], json!(["a", "b"]));
}

#[tokio::test]
async fn init_failure_retains_plugin_in_failed_state() {
    let manager = manager();
    let err = manager
        .register(
            PluginBuilder::new("broken", "1.0.0")
                .hook(HookPoint::Init, |_ctx| async {
                    Err(AppError::plugin("init exploded"))
                })
                .build(),
        )
        .await
        .expect_err("registration reports failure");
    assert!(err.is_kind(ErrorKind::Plugin));

    // Retained for inspection, but out of dispatch.
    assert!(manager.has_plugin("broken").await);
    assert_eq!(
        manager.plugin_state("broken").await,
        Some(PluginState::Failed)
    );
    let health = manager.plugin_health("broken").expect("health record");
    assert_eq!(health.status, HealthStatus::Failed);
    assert!(!health.enabled);
}

#[tokio::test]
async fn enable_reruns_init() {
    let manager = manager();
    let init_runs = Arc::new(AtomicUsize::new(0));
    let counter = init_runs.clone();

    manager
        .register(
            PluginBuilder::new("a", "1.0.0")
                .hook(HookPoint::Init, move |ctx| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(ctx.value) }
                })
                .build(),
        )
        .await
        .expect("register");
    assert_eq!(init_runs.load(Ordering::SeqCst), 1);

    manager.disable_plugin("a").await.expect("disable");
    manager.enable_plugin("a").await.expect("enable");
    assert_eq!(init_runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn incompatible_api_requirement_blocks_registration() {
    let manager = manager();
    let err = manager
        .register(
            PluginBuilder::new("future", "1.0.0")
                .api_requirement("2.0.0", ApiCompatMode::Major)
                .build(),
        )
        .await
        .expect_err("host is 1.0.0");
    assert!(err.is_kind(ErrorKind::Compatibility));
    assert!(!manager.has_plugin("future").await);
}

#[tokio::test]
async fn compatible_api_requirement_is_accepted() {
    let manager = manager();
    manager
        .register(
            PluginBuilder::new("ok", "1.0.0")
                .api_requirement("1.0.0", ApiCompatMode::Exact)
                .build(),
        )
        .await
        .expect("register");
}

#[tokio::test(start_paused = true)]
async fn timeout_error_fails_one_call_and_spares_siblings() {
    let manager = manager();
    manager.set_timeout_policy(
        HookPoint::OnProgress,
        HookTimeout {
            timeout_ms: 50,
            action: TimeoutAction::Error,
        },
    );

    let sibling_ran = Arc::new(AtomicBool::new(false));
    let flag = sibling_ran.clone();

    manager
        .register(
            PluginBuilder::new("stuck", "1.0.0")
                .hook(HookPoint::OnProgress, |_ctx| async {
                    std::future::pending::<()>().await;
                    unreachable!()
                })
                .build(),
        )
        .await
        .expect("stuck");
    manager
        .register(
            PluginBuilder::new("fast", "1.0.0")
                .hook(HookPoint::OnProgress, move |ctx| {
                    flag.store(true, Ordering::SeqCst);
                    async move { Ok(ctx.value) }
                })
                .build(),
        )
        .await
        .expect("fast");

    // Parallel notification hook: the invocation itself succeeds even
    // though one handler times out.
    manager
        .invoke_hook(HookPoint::OnProgress, json!({"sent": 1}), Vec::new())
        .await
        .expect("parallel invoke");

    assert!(sibling_ran.load(Ordering::SeqCst));

    let session = manager.current_trace_session();
    assert_eq!(session.totals.timeouts, 1);

    let stuck = manager.plugin_health("stuck").expect("health");
    assert_eq!(stuck.performance.total_errors, 1);
    let fast = manager.plugin_health("fast").expect("health");
    assert_eq!(fast.performance.total_errors, 0);
}

#[tokio::test(start_paused = true)]
async fn abort_timeout_stops_sequential_chain() {
    let manager = manager();
    manager.set_timeout_policy(
        HookPoint::BeforeUpload,
        HookTimeout {
            timeout_ms: 50,
            action: TimeoutAction::Abort,
        },
    );

    let second_ran = Arc::new(AtomicBool::new(false));
    let flag = second_ran.clone();

    manager
        .register(
            PluginBuilder::new("stuck", "1.0.0")
                .hook(HookPoint::BeforeUpload, |_ctx| async {
                    std::future::pending::<()>().await;
                    unreachable!()
                })
                .build(),
        )
        .await
        .expect("stuck");
    manager
        .register(
            PluginBuilder::new("after", "1.0.0")
                .hook(HookPoint::BeforeUpload, move |ctx| {
                    flag.store(true, Ordering::SeqCst);
                    async move { Ok(ctx.value) }
                })
                .build(),
        )
        .await
        .expect("after");

    let err = manager
        .invoke_hook(HookPoint::BeforeUpload, json!({}), Vec::new())
        .await
        .expect_err("chain aborts");
    assert!(err.is_kind(ErrorKind::Timeout));
    assert!(!second_ran.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn warn_timeout_still_honors_late_result() {
    let manager = manager();
    manager.set_timeout_policy(
        HookPoint::BeforeUpload,
        HookTimeout {
            timeout_ms: 50,
            action: TimeoutAction::Warn,
        },
    );

    manager
        .register(
            PluginBuilder::new("slow", "1.0.0")
                .hook(HookPoint::BeforeUpload, |ctx| async move {
                    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                    let mut value = ctx.value;
                    value["slow"] = json!(true);
                    Ok(value)
                })
                .build(),
        )
        .await
        .expect("slow");

    let out = manager
        .invoke_hook(HookPoint::BeforeUpload, json!({}), Vec::new())
        .await
        .expect("invoke");
    assert_eq!(out["slow"], json!(true));
}

#[tokio::test]
async fn handler_error_is_isolated_in_sequential_chain() {
    let manager = manager();
    manager
        .register(
            PluginBuilder::new("faulty", "1.0.0")
                .hook(HookPoint::BeforeUpload, |_ctx| async {
                    Err(AppError::plugin("boom"))
                })
                .build(),
        )
        .await
        .expect("faulty");
    manager
        .register(tagging_plugin("steady", "1.0.0"))
        .await
        .expect("steady");
    manager
        .set_priorities(HashMap::from([
            ("faulty".to_string(), 1),
            ("steady".to_string(), 2),
        ]))
        .await;

    // The faulty handler is isolated; the chain continues with the value
    // it received.
    let out = manager
        .invoke_hook(HookPoint::BeforeUpload, json!({}), Vec::new())
        .await
        .expect("invoke");
    assert_eq!(out["tags"], json!(["steady"]));

    let health = manager.plugin_health("faulty").expect("health");
    assert_eq!(health.performance.total_errors, 1);
}

#[tokio::test]
async fn opted_out_plugin_propagates_errors() {
    let manager = manager();
    manager
        .register(
            PluginBuilder::new("strict", "1.0.0")
                .propagate_errors()
                .hook(HookPoint::BeforeUpload, |_ctx| async {
                    Err(AppError::plugin("boom"))
                })
                .build(),
        )
        .await
        .expect("strict");
    manager
        .register(tagging_plugin("steady", "1.0.0"))
        .await
        .expect("steady");

    let err = manager
        .invoke_hook(HookPoint::BeforeUpload, json!({}), Vec::new())
        .await
        .expect_err("error propagates");
    assert!(err.is_kind(ErrorKind::Plugin));
}

#[tokio::test]
async fn parallel_merge_object_merge_combines_results() {
    let manager = manager();
    manager.set_execution_mode(HookPoint::AfterUpload, ExecutionMode::ParallelMerge);
    manager.set_merge_strategy(HookPoint::AfterUpload, MergeStrategy::ObjectMerge);

    manager
        .register(
            PluginBuilder::new("left", "1.0.0")
                .hook(HookPoint::AfterUpload, |_ctx| async { Ok(json!({"b": 2})) })
                .build(),
        )
        .await
        .expect("left");
    manager
        .register(
            PluginBuilder::new("right", "1.0.0")
                .hook(HookPoint::AfterUpload, |_ctx| async { Ok(json!({"c": 3})) })
                .build(),
        )
        .await
        .expect("right");

    let out = manager
        .invoke_hook(HookPoint::AfterUpload, json!({"a": 1}), Vec::new())
        .await
        .expect("invoke");
    assert_eq!(out["a"], json!(1));
    assert_eq!(out["b"], json!(2));
    assert_eq!(out["c"], json!(3));
}

#[tokio::test]
async fn parallel_merge_array_concat() {
    let manager = manager();
    manager.set_execution_mode(HookPoint::AfterUpload, ExecutionMode::ParallelMerge);
    manager.set_merge_strategy(HookPoint::AfterUpload, MergeStrategy::ArrayConcat);

    manager
        .register(
            PluginBuilder::new("lister", "1.0.0")
                .hook(HookPoint::AfterUpload, |_ctx| async { Ok(json!([2, 3])) })
                .build(),
        )
        .await
        .expect("lister");
    manager
        .register(
            PluginBuilder::new("scalar", "1.0.0")
                .hook(HookPoint::AfterUpload, |_ctx| async { Ok(json!(9)) })
                .build(),
        )
        .await
        .expect("scalar");

    let out = manager
        .invoke_hook(HookPoint::AfterUpload, json!([1]), Vec::new())
        .await
        .expect("invoke");
    let items = out.as_array().expect("array");
    assert_eq!(items.len(), 4);
    assert!(items.contains(&json!(1)));
    assert!(items.contains(&json!(9)));
}

#[tokio::test]
async fn parallel_hook_returns_initial_value() {
    let manager = manager();
    manager
        .register(
            PluginBuilder::new("observer", "1.0.0")
                .hook(HookPoint::AfterUpload, |_ctx| async {
                    Ok(json!({"ignored": true}))
                })
                .build(),
        )
        .await
        .expect("observer");

    let out = manager
        .invoke_hook(HookPoint::AfterUpload, json!({"file": "a.bin"}), Vec::new())
        .await
        .expect("invoke");
    assert_eq!(out, json!({"file": "a.bin"}));
}

#[tokio::test]
async fn lifecycle_events_are_emitted() {
    let manager = manager();
    let registered = Arc::new(AtomicUsize::new(0));
    let unregistered = Arc::new(AtomicUsize::new(0));

    let counter = registered.clone();
    manager.events().on(EventKind::Registered, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = unregistered.clone();
    manager.events().on(EventKind::Unregistered, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    manager.register(noop_plugin("a", "1.0.0")).await.expect("a");
    manager.unregister("a").await.expect("unregister");

    assert_eq!(registered.load(Ordering::SeqCst), 1);
    assert_eq!(unregistered.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn config_updates_emit_and_persist() {
    let manager = manager();
    manager.register(noop_plugin("a", "1.0.0")).await.expect("a");

    let updates = Arc::new(AtomicUsize::new(0));
    let counter = updates.clone();
    manager.events().on(EventKind::ConfigUpdated, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    manager
        .update_plugin_config("a", json!({"level": "debug"}))
        .await
        .expect("update");
    assert_eq!(
        manager.plugin_config("a").await,
        Some(json!({"level": "debug"}))
    );
    assert_eq!(updates.load(Ordering::SeqCst), 1);

    let err = manager
        .update_plugin_config("ghost", Value::Null)
        .await
        .expect_err("unknown plugin");
    assert!(err.is_kind(ErrorKind::NotFound));
}

#[tokio::test]
async fn cleanup_hook_runs_on_unregister() {
    let manager = manager();
    let cleaned = Arc::new(AtomicBool::new(false));
    let flag = cleaned.clone();

    manager
        .register(
            PluginBuilder::new("tidy", "1.0.0")
                .hook(HookPoint::Cleanup, move |ctx| {
                    flag.store(true, Ordering::SeqCst);
                    async move { Ok(ctx.value) }
                })
                .build(),
        )
        .await
        .expect("register");

    manager.unregister("tidy").await.expect("unregister");
    assert!(cleaned.load(Ordering::SeqCst));
    assert!(manager.plugin_health("tidy").is_none());
}

#[tokio::test]
async fn trace_records_dispatched_calls() {
    let manager = manager();
    manager
        .register(tagging_plugin("a", "1.0.0"))
        .await
        .expect("a");

    manager
        .invoke_hook(HookPoint::BeforeUpload, json!({}), Vec::new())
        .await
        .expect("invoke");

    let aggregate = manager.trace_data();
    assert_eq!(aggregate.per_plugin["a"].calls, 1);
    assert_eq!(aggregate.per_hook["before_upload"].calls, 1);

    let report = manager.trace_report();
    assert!(report.contains("before_upload"));
}

#[tokio::test]
async fn install_receives_host_context() {
    let manager = manager();
    let seen_api = Arc::new(AtomicBool::new(false));
    let flag = seen_api.clone();

    manager
        .register(
            PluginBuilder::new("probe", "1.0.0")
                .on_install(move |host| {
                    flag.store(host.api_version == "1.0.0", Ordering::SeqCst);
                    async { Ok(()) }
                })
                .build(),
        )
        .await
        .expect("register");

    assert!(seen_api.load(Ordering::SeqCst));
}
