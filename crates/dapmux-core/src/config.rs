//! Configuration resolution for dapmux.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/dapmux/settings.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::protocol::DEFAULT_MAX_FRAME_BYTES;

/// Complete dapmux configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub mux: MuxConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Physical transport settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransportConfig {
    /// Address to listen on when a port is given.
    pub listen_host: String,
    /// Largest accepted frame body.
    pub max_frame_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_host: "127.0.0.1".to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Multiplexer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MuxConfig {
    /// Capacity of the outbound frame queue shared by all sessions.
    pub outbound_capacity: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Load configuration with hierarchical resolution. Each file only needs
/// the keys it changes; later layers override earlier ones key by key.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut layered = serde_json::to_value(Config::default())?;

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        merge_values(&mut layered, read_config_value(&global_path)?);
    }

    if let Some(path) = explicit {
        merge_values(&mut layered, read_config_value(path)?);
    }

    let mut config: Config = serde_json::from_value(layered)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("dapmux").join("settings.json"))
}

fn read_config_value(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

#[cfg(test)]
fn load_config_file(path: &Path) -> Result<Config> {
    let mut layered = serde_json::to_value(Config::default())?;
    merge_values(&mut layered, read_config_value(path)?);
    serde_json::from_value(layered).map_err(|e| Error::Config(format!("Invalid configuration: {e}")))
}

/// Recursively overlay `overlay` onto `base`; objects merge, anything else
/// replaces.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("DAPMUX_LISTEN_HOST") {
        config.transport.listen_host = val;
    }
    if let Some(n) = var("DAPMUX_MAX_FRAME_BYTES").and_then(|v| v.parse().ok()) {
        config.transport.max_frame_bytes = n;
    }
    if let Some(n) = var("DAPMUX_OUTBOUND_CAPACITY").and_then(|v| v.parse().ok()) {
        config.mux.outbound_capacity = n;
    }
    if let Some(val) = var("DAPMUX_LOG_LEVEL") {
        config.logging.level = val;
    }
}
