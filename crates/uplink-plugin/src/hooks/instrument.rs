//! Per-call instrumentation, decoupled from dispatch logic.
//!
//! Every handler invocation, whatever the execution mode, passes through
//! this wrapper, which emits `before`/`after`/`error`/`performance` events
//! on the bus and feeds the health monitor and trace recorder.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use uplink_core::AppResult;
use uplink_core::error::ErrorKind;
use uplink_core::events::{EventBus, HookErrorEvent, HookEvent, PerformanceEvent, PluginEvent};

use crate::health::HealthMonitor;
use crate::hooks::definitions::HookPoint;
use crate::trace::{CallStatus, HookCallRecord, TraceRecorder, value_type_tag};

/// Shared sinks for hook call telemetry.
#[derive(Debug, Clone)]
pub struct Instrumentation {
    bus: Arc<EventBus>,
    health: Arc<HealthMonitor>,
    trace: Arc<TraceRecorder>,
}

impl Instrumentation {
    /// Creates instrumentation wired to the given sinks.
    pub fn new(bus: Arc<EventBus>, health: Arc<HealthMonitor>, trace: Arc<TraceRecorder>) -> Self {
        Self { bus, health, trace }
    }

    /// Signals that a handler is about to run.
    pub fn before(&self, plugin: &str, hook: HookPoint) {
        self.bus.emit(&PluginEvent::HookBefore(HookEvent {
            plugin: plugin.to_string(),
            hook: hook.as_str().to_string(),
            at: Utc::now(),
        }));
    }

    /// Records a settled handler call and emits the matching events.
    #[allow(clippy::too_many_arguments)]
    pub fn settled(
        &self,
        plugin: &str,
        hook: HookPoint,
        started_at: DateTime<Utc>,
        duration: Duration,
        value_type: &'static str,
        arg_types: Vec<&'static str>,
        result: &AppResult<Value>,
    ) {
        let now = Utc::now();
        let (status, error, result_type) = match result {
            Ok(value) => (CallStatus::Success, None, Some(value_type_tag(value))),
            Err(err) if err.is_kind(ErrorKind::Timeout) => {
                (CallStatus::Timeout, Some(err.to_string()), None)
            }
            Err(err) => (CallStatus::Error, Some(err.to_string()), None),
        };

        match status {
            CallStatus::Success => {
                self.bus.emit(&PluginEvent::HookAfter(HookEvent {
                    plugin: plugin.to_string(),
                    hook: hook.as_str().to_string(),
                    at: now,
                }));
            }
            CallStatus::Error | CallStatus::Timeout => {
                self.bus.emit(&PluginEvent::HookError(HookErrorEvent {
                    plugin: plugin.to_string(),
                    hook: hook.as_str().to_string(),
                    error: error.clone().unwrap_or_default(),
                    timed_out: status == CallStatus::Timeout,
                    at: now,
                }));
            }
        }

        self.bus.emit(&PluginEvent::HookPerformance(PerformanceEvent {
            plugin: plugin.to_string(),
            hook: hook.as_str().to_string(),
            duration_ms: duration.as_millis() as u64,
            at: now,
        }));

        self.health
            .record_execution(plugin, hook.as_str(), duration, error.as_deref());

        self.trace.record(HookCallRecord {
            hook: hook.as_str().to_string(),
            plugin: plugin.to_string(),
            at: started_at,
            duration_ms: duration.as_millis() as u64,
            status,
            error,
            value_type,
            arg_types,
            result_type,
        });
    }
}
