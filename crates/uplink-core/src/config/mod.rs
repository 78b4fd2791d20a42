//! Engine configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod conflict;
pub mod dispatch;
pub mod health;
pub mod trace;

use serde::{Deserialize, Serialize};

use self::conflict::ConflictConfig;
use self::dispatch::DispatchConfig;
use self::health::HealthConfig;
use self::trace::TraceConfig;

use crate::error::AppError;

/// Root plugin-engine configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Host identity settings.
    #[serde(default)]
    pub host: HostConfig,
    /// Hook dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Plugin health monitoring settings.
    #[serde(default)]
    pub health: HealthConfig,
    /// Hook call tracing settings.
    #[serde(default)]
    pub trace: TraceConfig,
    /// Conflict resolution settings.
    #[serde(default)]
    pub conflict: ConflictConfig,
}

/// Host identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// The host's own API version, checked against plugin requirements.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
        }
    }
}

fn default_api_version() -> String {
    "1.0.0".to_string()
}

impl EngineConfig {
    /// Loads configuration for the given environment.
    ///
    /// Layers `config/default.toml`, `config/{env}.toml`, and environment
    /// variables prefixed with `UPLINK_` (e.g. `UPLINK_HOST__API_VERSION`).
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("UPLINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
