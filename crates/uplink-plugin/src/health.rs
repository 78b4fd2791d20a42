//! Per-plugin rolling performance statistics and derived health status.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use uplink_core::config::health::HealthConfig;

/// Derived health classification for a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failed,
}

/// Counters for one hook of one plugin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookStats {
    /// Number of executions.
    pub executions: u64,
    /// Cumulative execution time in milliseconds.
    pub total_duration_ms: u64,
    /// Longest single execution in milliseconds.
    pub max_duration_ms: u64,
    /// Number of failed executions.
    pub errors: u64,
}

/// Aggregated performance counters for a plugin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceData {
    /// Per-hook counters, keyed by hook name.
    pub hooks: HashMap<String, HookStats>,
    /// Total executions across all hooks.
    pub total_executions: u64,
    /// Total errors across all hooks.
    pub total_errors: u64,
    /// `total_errors / total_executions`, or 0 when nothing ran yet.
    pub error_rate: f64,
}

impl PerformanceData {
    /// Mean duration across every recorded execution, in milliseconds.
    pub fn mean_duration_ms(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        let total: u64 = self.hooks.values().map(|s| s.total_duration_ms).sum();
        total as f64 / self.total_executions as f64
    }
}

/// Health record for one plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Derived status.
    pub status: HealthStatus,
    /// Whether the plugin currently participates in dispatch.
    pub enabled: bool,
    /// Most recent error message, if any.
    pub last_error: Option<String>,
    /// When the most recent error occurred.
    pub last_error_at: Option<DateTime<Utc>>,
    /// When this record was last touched.
    pub last_updated: DateTime<Utc>,
    /// Rolling performance counters.
    pub performance: PerformanceData,
}

impl HealthRecord {
    fn fresh() -> Self {
        Self {
            status: HealthStatus::Healthy,
            enabled: true,
            last_error: None,
            last_error_at: None,
            last_updated: Utc::now(),
            performance: PerformanceData::default(),
        }
    }
}

/// Entry in the performance report's top-N lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedPlugin {
    /// Plugin name.
    pub name: String,
    /// The ranking metric (mean duration in ms, or error rate).
    pub value: f64,
}

/// Aggregated report over every tracked plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Number of tracked plugins.
    pub total_plugins: usize,
    /// Count with status `healthy`.
    pub healthy: usize,
    /// Count with status `degraded`.
    pub degraded: usize,
    /// Count with status `failed`.
    pub failed: usize,
    /// Up to five slowest plugins by mean hook duration.
    pub slowest: Vec<RankedPlugin>,
    /// Up to five plugins with the highest error rate.
    pub most_errors: Vec<RankedPlugin>,
}

/// Tracks rolling per-plugin hook statistics and derives health status.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    records: RwLock<HashMap<String, HealthRecord>>,
}

impl HealthMonitor {
    /// Creates a monitor with the given thresholds.
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds a fresh record for a newly registered plugin.
    pub fn init_plugin(&self, plugin: &str) {
        let mut records = self.records.write().expect("health records lock poisoned");
        records.insert(plugin.to_string(), HealthRecord::fresh());
        debug!(plugin = %plugin, "Health record created");
    }

    /// Records one hook execution.
    ///
    /// The status is re-derived only when the execution failed; successful
    /// calls never change the classification on their own.
    pub fn record_execution(
        &self,
        plugin: &str,
        hook: &str,
        duration: Duration,
        error: Option<&str>,
    ) {
        let mut records = self.records.write().expect("health records lock poisoned");
        let record = records
            .entry(plugin.to_string())
            .or_insert_with(HealthRecord::fresh);

        let duration_ms = duration.as_millis() as u64;
        let stats = record.performance.hooks.entry(hook.to_string()).or_default();
        stats.executions += 1;
        stats.total_duration_ms += duration_ms;
        stats.max_duration_ms = stats.max_duration_ms.max(duration_ms);

        record.performance.total_executions += 1;
        if let Some(message) = error {
            stats.errors += 1;
            record.performance.total_errors += 1;
            record.last_error = Some(message.to_string());
            record.last_error_at = Some(Utc::now());
        }
        record.performance.error_rate =
            record.performance.total_errors as f64 / record.performance.total_executions as f64;
        record.last_updated = Utc::now();

        if error.is_some() {
            let status = self.derive_status(record.performance.error_rate);
            if status != record.status {
                info!(
                    plugin = %plugin,
                    error_rate = record.performance.error_rate,
                    status = ?status,
                    "Plugin health status changed"
                );
            }
            record.status = status;
        }
    }

    /// Marks a plugin failed outside hook dispatch (e.g. `init` blew up
    /// during registration).
    pub fn record_failure(&self, plugin: &str, error: &str) {
        let mut records = self.records.write().expect("health records lock poisoned");
        let record = records
            .entry(plugin.to_string())
            .or_insert_with(HealthRecord::fresh);
        record.status = HealthStatus::Failed;
        record.last_error = Some(error.to_string());
        record.last_error_at = Some(Utc::now());
        record.last_updated = Utc::now();
    }

    /// Updates the record's enabled flag.
    pub fn set_enabled(&self, plugin: &str, enabled: bool) {
        let mut records = self.records.write().expect("health records lock poisoned");
        if let Some(record) = records.get_mut(plugin) {
            record.enabled = enabled;
            record.last_updated = Utc::now();
        }
    }

    /// Returns a snapshot of one plugin's record.
    pub fn record(&self, plugin: &str) -> Option<HealthRecord> {
        let records = self.records.read().expect("health records lock poisoned");
        records.get(plugin).cloned()
    }

    /// Returns a snapshot of every record.
    pub fn all(&self) -> HashMap<String, HealthRecord> {
        self.records
            .read()
            .expect("health records lock poisoned")
            .clone()
    }

    /// Zeroes a plugin's counters and restores `healthy`.
    pub fn reset(&self, plugin: &str) {
        let mut records = self.records.write().expect("health records lock poisoned");
        if let Some(record) = records.get_mut(plugin) {
            *record = HealthRecord::fresh();
        }
    }

    /// Drops a plugin's record entirely.
    pub fn remove(&self, plugin: &str) {
        let mut records = self.records.write().expect("health records lock poisoned");
        records.remove(plugin);
    }

    /// Evicts records untouched for longer than the retention window.
    ///
    /// Returns how many records were removed.
    pub fn cleanup_expired(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::hours(self.config.retention_hours as i64);
        let mut records = self.records.write().expect("health records lock poisoned");
        let before = records.len();
        records.retain(|_, record| record.last_updated >= cutoff);
        before - records.len()
    }

    /// Builds the aggregate report: status counts plus the top-5 slowest
    /// and top-5 highest-error-rate plugins.
    pub fn report(&self) -> PerformanceReport {
        let records = self.records.read().expect("health records lock poisoned");

        let mut healthy = 0;
        let mut degraded = 0;
        let mut failed = 0;
        for record in records.values() {
            match record.status {
                HealthStatus::Healthy => healthy += 1,
                HealthStatus::Degraded => degraded += 1,
                HealthStatus::Failed => failed += 1,
            }
        }

        let mut slowest: Vec<RankedPlugin> = records
            .iter()
            .filter(|(_, r)| r.performance.total_executions > 0)
            .map(|(name, r)| RankedPlugin {
                name: name.clone(),
                value: r.performance.mean_duration_ms(),
            })
            .collect();
        slowest.sort_by(|a, b| b.value.total_cmp(&a.value));
        slowest.truncate(5);

        let mut most_errors: Vec<RankedPlugin> = records
            .iter()
            .filter(|(_, r)| r.performance.total_errors > 0)
            .map(|(name, r)| RankedPlugin {
                name: name.clone(),
                value: r.performance.error_rate,
            })
            .collect();
        most_errors.sort_by(|a, b| b.value.total_cmp(&a.value));
        most_errors.truncate(5);

        PerformanceReport {
            total_plugins: records.len(),
            healthy,
            degraded,
            failed,
            slowest,
            most_errors,
        }
    }

    fn derive_status(&self, error_rate: f64) -> HealthStatus {
        if error_rate >= self.config.failed_threshold {
            HealthStatus::Failed
        } else if error_rate >= self.config.degraded_threshold {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
