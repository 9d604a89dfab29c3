//! Engine configuration using Figment
//!
//! Configuration is layered:
//! 1. Built-in defaults ([`EngineConfig::default`])
//! 2. A TOML file (`config/regsync.toml` unless a path is given)
//! 3. Environment variables prefixed with `REGSYNC_`, nested keys separated by `__`
//!    (for example `REGSYNC_APPLICATION__LOG_LEVEL=debug`)
//!
//! Initial module settings are given as name/value tables and go through the same
//! range checks as the typed setters:
//!
//! ```toml
//! [application]
//! name = "bench analyzer"
//! log_level = "debug"
//!
//! [simulation]
//! fail_write_address = 0x40
//!
//! [receiver]
//! StartFrequency = 150e6
//! Detector = "Rms"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::hardware::SimulatedRegisterBus;
use crate::parameter::ParamValue;
use crate::pipeline::ApplySettings;

pub const DEFAULT_CONFIG_PATH: &str = "config/regsync.toml";
pub const ENV_PREFIX: &str = "REGSYNC_";

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub application: ApplicationConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Initial receiver settings by property name.
    #[serde(default)]
    pub receiver: BTreeMap<String, ParamValue>,
    /// Initial source settings by property name.
    #[serde(default)]
    pub source: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub name: String,
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// pretty, compact or json
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Failure injection for the simulated register bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub fail_write_address: Option<u64>,
    #[serde(default)]
    pub fail_after_writes: Option<usize>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            application: ApplicationConfig {
                name: "regsync".to_string(),
                log_level: default_log_level(),
                log_format: default_log_format(),
            },
            simulation: SimulationConfig::default(),
            receiver: BTreeMap::new(),
            source: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn load() -> SyncResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load defaults, then `path` (skipped if missing), then the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> SyncResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            return Err(SyncError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LEVELS.join(", ")
            )));
        }

        let format = self.application.log_format.to_lowercase();
        if !VALID_FORMATS.contains(&format.as_str()) {
            return Err(SyncError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                VALID_FORMATS.join(", ")
            )));
        }

        if self.simulation.fail_write_address.is_some() && self.simulation.fail_after_writes.is_some()
        {
            return Err(SyncError::Configuration(
                "simulation.fail_write_address and simulation.fail_after_writes are exclusive"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

impl SimulationConfig {
    /// Simulated bus with the configured failure injection armed.
    pub fn build_bus(&self, name: &str) -> SimulatedRegisterBus {
        let bus = SimulatedRegisterBus::new(name);
        if let Some(address) = self.fail_write_address {
            bus.fail_writes_at(address);
        }
        if let Some(count) = self.fail_after_writes {
            bus.fail_after_writes(count);
        }
        bus
    }
}

/// Set each named property on `module`. Returns how many values changed.
pub fn apply_initial_settings(
    module: &mut dyn ApplySettings,
    values: &BTreeMap<String, ParamValue>,
) -> SyncResult<usize> {
    let mut changed = 0;
    for (name, value) in values {
        if module.set_value(name, value)? {
            changed += 1;
        }
    }
    Ok(changed)
}
