//! Session-scoped trace of every hook invocation.
//!
//! The recorder keeps one current session plus a bounded ring of historical
//! sessions. Sessions rotate automatically when the per-session call cap is
//! reached.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use uplink_core::config::trace::TraceConfig;

/// Outcome of a single recorded hook call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Success,
    Error,
    Timeout,
}

/// One hook handler invocation.
#[derive(Debug, Clone, Serialize)]
pub struct HookCallRecord {
    /// Hook name.
    pub hook: String,
    /// Plugin name.
    pub plugin: String,
    /// When the call started.
    pub at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// How the call settled.
    pub status: CallStatus,
    /// Error text when `status` is not `success`.
    pub error: Option<String>,
    /// Type tag of the input value.
    pub value_type: &'static str,
    /// Type tags of the extra arguments.
    pub arg_types: Vec<&'static str>,
    /// Type tag of the returned value, when the call succeeded.
    pub result_type: Option<&'static str>,
}

/// Session-level totals.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionTotals {
    /// Total recorded calls.
    pub calls: u64,
    /// Calls that settled with an error.
    pub errors: u64,
    /// Calls that timed out.
    pub timeouts: u64,
}

/// A bounded, time-ordered record of hook invocations.
#[derive(Debug, Clone, Serialize)]
pub struct TraceSession {
    /// Session identifier.
    pub id: Uuid,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the session ended (`None` while current).
    pub ended_at: Option<DateTime<Utc>>,
    /// Ordered call records.
    pub calls: Vec<HookCallRecord>,
    /// Running totals.
    pub totals: SessionTotals,
}

impl TraceSession {
    fn start() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            calls: Vec::new(),
            totals: SessionTotals::default(),
        }
    }
}

/// Filter for querying recorded calls.
#[derive(Debug, Clone, Default)]
pub struct TraceQuery {
    /// Only calls at or after this time.
    pub since: Option<DateTime<Utc>>,
    /// Only calls at or before this time.
    pub until: Option<DateTime<Utc>>,
    /// Only calls from this plugin.
    pub plugin: Option<String>,
    /// Only calls to this hook.
    pub hook: Option<String>,
    /// Only calls that settled with an error (timeouts included).
    pub errors_only: bool,
    /// Only calls that timed out.
    pub timeouts_only: bool,
    /// Maximum number of records returned.
    pub limit: Option<usize>,
}

/// Per-plugin or per-hook aggregate line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceStats {
    /// Total calls.
    pub calls: u64,
    /// Calls that settled with an error.
    pub errors: u64,
    /// Calls that timed out.
    pub timeouts: u64,
    /// Cumulative duration in milliseconds.
    pub total_duration_ms: u64,
}

/// A single point on the cross-session timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// When the call started.
    pub at: DateTime<Utc>,
    /// Plugin name.
    pub plugin: String,
    /// Hook name.
    pub hook: String,
    /// How the call settled.
    pub status: CallStatus,
}

/// Structured aggregate over every retained session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceAggregate {
    /// Number of retained sessions (current included).
    pub sessions: usize,
    /// Per-plugin stats.
    pub per_plugin: HashMap<String, TraceStats>,
    /// Per-hook stats.
    pub per_hook: HashMap<String, TraceStats>,
    /// Time-ordered call timeline.
    pub timeline: Vec<TimelineEntry>,
}

/// Records hook invocations into bounded trace sessions.
#[derive(Debug)]
pub struct TraceRecorder {
    config: TraceConfig,
    inner: RwLock<TraceInner>,
}

#[derive(Debug)]
struct TraceInner {
    current: TraceSession,
    history: VecDeque<TraceSession>,
}

impl TraceRecorder {
    /// Creates a recorder with a fresh current session.
    pub fn new(config: TraceConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(TraceInner {
                current: TraceSession::start(),
                history: VecDeque::new(),
            }),
        }
    }

    /// Appends a call record to the current session.
    ///
    /// Rotates to a fresh session first when the per-session cap is hit.
    pub fn record(&self, record: HookCallRecord) {
        if !self.config.enabled {
            return;
        }

        let mut inner = self.inner.write().expect("trace sessions lock poisoned");
        if inner.current.calls.len() >= self.config.max_calls_per_session {
            self.rotate_locked(&mut inner);
        }

        inner.current.totals.calls += 1;
        match record.status {
            CallStatus::Error => inner.current.totals.errors += 1,
            CallStatus::Timeout => inner.current.totals.timeouts += 1,
            CallStatus::Success => {}
        }
        inner.current.calls.push(record);
    }

    /// Ends the current session and starts a new one.
    pub fn rotate(&self) {
        let mut inner = self.inner.write().expect("trace sessions lock poisoned");
        self.rotate_locked(&mut inner);
    }

    fn rotate_locked(&self, inner: &mut TraceInner) {
        let mut finished = std::mem::replace(&mut inner.current, TraceSession::start());
        finished.ended_at = Some(Utc::now());
        debug!(session = %finished.id, calls = finished.totals.calls, "Trace session rotated");
        inner.history.push_back(finished);
        while inner.history.len() > self.config.max_sessions {
            inner.history.pop_front();
        }
    }

    /// Returns a snapshot of the current session.
    pub fn current_session(&self) -> TraceSession {
        self.inner
            .read()
            .expect("trace sessions lock poisoned")
            .current
            .clone()
    }

    /// Returns every retained session, oldest first, current last.
    pub fn sessions(&self) -> Vec<TraceSession> {
        let inner = self.inner.read().expect("trace sessions lock poisoned");
        let mut out: Vec<TraceSession> = inner.history.iter().cloned().collect();
        out.push(inner.current.clone());
        out
    }

    /// Returns call records matching the query, oldest first.
    pub fn query(&self, query: &TraceQuery) -> Vec<HookCallRecord> {
        let sessions = self.sessions();
        let mut out = Vec::new();

        'outer: for session in &sessions {
            for record in &session.calls {
                if let Some(since) = query.since {
                    if record.at < since {
                        continue;
                    }
                }
                if let Some(until) = query.until {
                    if record.at > until {
                        continue;
                    }
                }
                if let Some(plugin) = &query.plugin {
                    if &record.plugin != plugin {
                        continue;
                    }
                }
                if let Some(hook) = &query.hook {
                    if &record.hook != hook {
                        continue;
                    }
                }
                if query.timeouts_only && record.status != CallStatus::Timeout {
                    continue;
                }
                if query.errors_only && record.status == CallStatus::Success {
                    continue;
                }

                out.push(record.clone());
                if let Some(limit) = query.limit {
                    if out.len() >= limit {
                        break 'outer;
                    }
                }
            }
        }

        out
    }

    /// Builds the structured aggregate across every retained session.
    pub fn aggregate(&self) -> TraceAggregate {
        let sessions = self.sessions();
        let mut per_plugin: HashMap<String, TraceStats> = HashMap::new();
        let mut per_hook: HashMap<String, TraceStats> = HashMap::new();
        let mut timeline = Vec::new();

        for session in &sessions {
            for record in &session.calls {
                for stats in [
                    per_plugin.entry(record.plugin.clone()).or_default(),
                    per_hook.entry(record.hook.clone()).or_default(),
                ] {
                    stats.calls += 1;
                    stats.total_duration_ms += record.duration_ms;
                    match record.status {
                        CallStatus::Error => stats.errors += 1,
                        CallStatus::Timeout => stats.timeouts += 1,
                        CallStatus::Success => {}
                    }
                }
                timeline.push(TimelineEntry {
                    at: record.at,
                    plugin: record.plugin.clone(),
                    hook: record.hook.clone(),
                    status: record.status,
                });
            }
        }

        timeline.sort_by_key(|entry| entry.at);

        TraceAggregate {
            sessions: sessions.len(),
            per_plugin,
            per_hook,
            timeline,
        }
    }

    /// Renders a human-readable report of the retained sessions.
    pub fn report(&self) -> String {
        let sessions = self.sessions();
        let mut out = String::new();
        let _ = writeln!(out, "hook trace: {} session(s)", sessions.len());

        for session in &sessions {
            let state = if session.ended_at.is_some() {
                "closed"
            } else {
                "current"
            };
            let _ = writeln!(
                out,
                "  session {} [{}] started {}: {} call(s), {} error(s), {} timeout(s)",
                session.id,
                state,
                session.started_at.format("%Y-%m-%d %H:%M:%S"),
                session.totals.calls,
                session.totals.errors,
                session.totals.timeouts,
            );
            for record in &session.calls {
                let _ = writeln!(
                    out,
                    "    {} {:>5}ms {:<8} {} / {}{}",
                    record.at.format("%H:%M:%S%.3f"),
                    record.duration_ms,
                    format!("{:?}", record.status).to_lowercase(),
                    record.plugin,
                    record.hook,
                    record
                        .error
                        .as_deref()
                        .map(|e| format!(" ({e})"))
                        .unwrap_or_default(),
                );
            }
        }

        out
    }
}

/// Coarse type tag for a JSON value, used in call records.
pub fn value_type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
