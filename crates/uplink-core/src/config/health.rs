//! Plugin health monitoring configuration.

use serde::{Deserialize, Serialize};

/// Health monitoring thresholds and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Error rate at or above which a plugin is reported `degraded`.
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: f64,
    /// Error rate at or above which a plugin is reported `failed`.
    #[serde(default = "default_failed_threshold")]
    pub failed_threshold: f64,
    /// Hours a health record may go untouched before eviction.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_threshold: default_degraded_threshold(),
            failed_threshold: default_failed_threshold(),
            retention_hours: default_retention_hours(),
        }
    }
}

fn default_degraded_threshold() -> f64 {
    0.1
}

fn default_failed_threshold() -> f64 {
    0.3
}

fn default_retention_hours() -> u64 {
    24
}
