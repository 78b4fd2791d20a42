//! Conflict detection and resolution between plugin descriptors.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use uplink_core::config::conflict::ResolutionStrategy;
use uplink_core::version::compare_versions;
use uplink_core::{AppError, AppResult};

use crate::hooks::definitions::HookPoint;
use crate::plugin::PluginInfo;

/// Fraction of shared hook names (relative to either side's own set) above
/// which two plugins are flagged as functionally overlapping.
const FUNCTIONALITY_OVERLAP_THRESHOLD: f64 = 0.7;

/// What kind of incompatibility was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// Same plugin name with a different version.
    Version,
    /// Heavy overlap between the two plugins' declared hook sets.
    Functionality,
    /// Declared API requirements clash.
    ApiCompatibility,
    /// Anything else.
    Other,
}

/// How serious a conflict is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Identity of one side of a conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRef {
    /// Plugin name.
    pub name: String,
    /// Plugin version.
    pub version: String,
}

impl PluginRef {
    fn from_info(info: &PluginInfo) -> Self {
        Self {
            name: info.name.clone(),
            version: info.version.clone(),
        }
    }
}

/// A detected incompatibility between a candidate and an installed plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// What kind of conflict this is.
    pub kind: ConflictKind,
    /// How serious it is.
    pub severity: ConflictSeverity,
    /// The strategy detection recommends.
    pub recommended: ResolutionStrategy,
    /// The plugin being registered.
    pub candidate: PluginRef,
    /// The plugin already installed.
    pub installed: PluginRef,
    /// Human-readable detail.
    pub detail: String,
}

/// Outcome of resolving a single conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Proceed with the candidate; the installed plugin must be removed first.
    ReplaceInstalled,
    /// Keep the installed plugin; the candidate registration is a no-op.
    RejectCandidate,
    /// Keep both plugins.
    Coexist,
}

/// Detects conflicts and resolves them via a configurable strategy.
#[derive(Debug)]
pub struct ConflictResolver {
    default_strategy: ResolutionStrategy,
    overrides: RwLock<HashMap<String, ResolutionStrategy>>,
}

impl ConflictResolver {
    /// Creates a resolver with the given global fallback strategy.
    pub fn new(default_strategy: ResolutionStrategy) -> Self {
        Self {
            default_strategy,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Sets a plugin-specific strategy override.
    pub fn set_override(&self, plugin: &str, strategy: ResolutionStrategy) {
        self.overrides
            .write()
            .expect("conflict overrides lock poisoned")
            .insert(plugin.to_string(), strategy);
    }

    /// Clears a plugin-specific strategy override.
    pub fn clear_override(&self, plugin: &str) {
        self.overrides
            .write()
            .expect("conflict overrides lock poisoned")
            .remove(plugin);
    }

    /// Scans the installed set for conflicts with a candidate plugin.
    ///
    /// `candidate_hooks` / the hook sets in `installed` are the declared
    /// hook names of each side, used for the functionality-overlap
    /// heuristic. Overlap detection is advisory; callers log it rather
    /// than block on it.
    pub fn detect(
        &self,
        candidate: &PluginInfo,
        candidate_hooks: &HashSet<HookPoint>,
        installed: &[(PluginInfo, HashSet<HookPoint>)],
    ) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        for (other, other_hooks) in installed {
            if other.name == candidate.name {
                conflicts.push(self.version_conflict(candidate, other));
                continue;
            }

            let ratio = overlap_ratio(candidate_hooks, other_hooks);
            if ratio > FUNCTIONALITY_OVERLAP_THRESHOLD {
                debug!(
                    candidate = %candidate.name,
                    installed = %other.name,
                    ratio = ratio,
                    "Hook-set overlap detected"
                );
                conflicts.push(Conflict {
                    kind: ConflictKind::Functionality,
                    severity: ConflictSeverity::Medium,
                    recommended: ResolutionStrategy::Coexist,
                    candidate: PluginRef::from_info(candidate),
                    installed: PluginRef::from_info(other),
                    detail: format!(
                        "plugins '{}' and '{}' share {:.0}% of their declared hooks",
                        candidate.name,
                        other.name,
                        ratio * 100.0
                    ),
                });
            }
        }

        conflicts
    }

    fn version_conflict(&self, candidate: &PluginInfo, installed: &PluginInfo) -> Conflict {
        // A strictly newer candidate recommends replacement; anything else
        // keeps the incumbent.
        let recommended = match compare_versions(&candidate.version, &installed.version) {
            Ok(Ordering::Greater) => ResolutionStrategy::UseLatest,
            _ => ResolutionStrategy::UseInstalled,
        };

        Conflict {
            kind: ConflictKind::Version,
            severity: ConflictSeverity::High,
            recommended,
            candidate: PluginRef::from_info(candidate),
            installed: PluginRef::from_info(installed),
            detail: format!(
                "plugin '{}' v{} is already installed; candidate is v{}",
                installed.name, installed.version, candidate.version
            ),
        }
    }

    /// Resolves a conflict into a concrete action.
    ///
    /// Strategy precedence: plugin-specific override, then the conflict's
    /// own recommendation (unless it is `Forbid`), then the global default.
    pub fn resolve(&self, conflict: &Conflict) -> AppResult<Resolution> {
        let override_strategy = self
            .overrides
            .read()
            .expect("conflict overrides lock poisoned")
            .get(&conflict.candidate.name)
            .copied();

        let strategy = override_strategy.unwrap_or(match conflict.recommended {
            ResolutionStrategy::Forbid => self.default_strategy,
            recommended => recommended,
        });

        match strategy {
            ResolutionStrategy::UseLatest => {
                let ordering =
                    compare_versions(&conflict.candidate.version, &conflict.installed.version)?;
                if ordering == Ordering::Greater {
                    Ok(Resolution::ReplaceInstalled)
                } else {
                    Ok(Resolution::RejectCandidate)
                }
            }
            ResolutionStrategy::UseInstalled => Ok(Resolution::RejectCandidate),
            ResolutionStrategy::Forbid => Err(AppError::conflict(format!(
                "registration of '{}' forbidden: {}",
                conflict.candidate.name, conflict.detail
            ))),
            ResolutionStrategy::Coexist => {
                warn!(
                    candidate = %conflict.candidate.name,
                    installed = %conflict.installed.name,
                    "Conflicting plugins kept side by side"
                );
                Ok(Resolution::Coexist)
            }
            ResolutionStrategy::Merge => Err(AppError::not_implemented(
                "merge resolution strategy is reserved",
            )),
        }
    }
}

/// Shared fraction of hook names relative to the smaller declared set.
///
/// Checking against both sides means a tiny plugin fully contained in a
/// large one still trips the heuristic.
fn overlap_ratio(a: &HashSet<HookPoint>, b: &HashSet<HookPoint>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count() as f64;
    let against_a = shared / a.len() as f64;
    let against_b = shared / b.len() as f64;
    against_a.max(against_b)
}
