//! Semantic-version utilities for plugin and host API compatibility.
//!
//! Version strings follow semver. Comparison is delegated to the `semver`
//! crate so pre-release ordering (`2.0.0-beta < 2.0.0`) comes out right.

use std::cmp::Ordering;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::result::AppResult;

/// Parses a semver version string.
pub fn parse_version(input: &str) -> AppResult<Version> {
    Version::parse(input.trim())
        .map_err(|e| AppError::with_source(crate::error::ErrorKind::Validation,
            format!("invalid version string '{input}'"), e))
}

/// Compares two semver version strings.
///
/// Returns `Ordering::Less` when `a` is older than `b`.
pub fn compare_versions(a: &str, b: &str) -> AppResult<Ordering> {
    let left = parse_version(a)?;
    let right = parse_version(b)?;
    Ok(left.cmp(&right))
}

/// How much of a declared API version must match the host's version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiCompatMode {
    /// The full version must match, pre-release included.
    Exact,
    /// Only the major component must match.
    Major,
    /// Major and minor components must match.
    Minor,
    /// Major, minor, and patch components must match.
    Patch,
}

impl Default for ApiCompatMode {
    fn default() -> Self {
        Self::Major
    }
}

/// A plugin's declared host-API requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRequirement {
    /// The API version the plugin was built against.
    pub version: String,
    /// Compatibility mode used when checking against the host.
    #[serde(default)]
    pub mode: ApiCompatMode,
}

impl ApiRequirement {
    /// Creates a requirement for the given version and mode.
    pub fn new(version: impl Into<String>, mode: ApiCompatMode) -> Self {
        Self {
            version: version.into(),
            mode,
        }
    }
}

/// Checks a plugin's declared API requirement against the host API version.
pub fn is_compatible(host_version: &str, requirement: &ApiRequirement) -> AppResult<bool> {
    let host = parse_version(host_version)?;
    let required = parse_version(&requirement.version)?;

    Ok(match requirement.mode {
        ApiCompatMode::Exact => host == required,
        ApiCompatMode::Major => host.major == required.major,
        ApiCompatMode::Minor => host.major == required.major && host.minor == required.minor,
        ApiCompatMode::Patch => {
            host.major == required.major
                && host.minor == required.minor
                && host.patch == required.patch
        }
    })
}
