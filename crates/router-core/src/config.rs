//! Process configuration loading.
//!
//! TOML is the sole config source, following a raw-then-validated two-pass
//! shape: an `Option`-heavy `Raw*` struct is deserialized first, then
//! checked field by field so every missing/invalid value produces a
//! specific [`ConfigError`].

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::registry::DriverConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl LogLevel {
    /// `fatal`/`panic` have no `tracing` equivalent; both map to `error`,
    /// the closest severity `tracing_subscriber::EnvFilter` understands.
    pub fn as_tracing_level(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal | LogLevel::Panic => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RootConfig {
    pub log_level: LogLevel,
    pub drivers: Vec<DriverConfig>,
}

#[derive(Debug, Deserialize)]
struct RawRootConfig {
    log_level: Option<String>,
    drivers: Option<Vec<RawDriverConfig>>,
}

#[derive(Debug, Deserialize)]
struct RawDriverConfig {
    id: Option<u32>,
    display_name: Option<String>,
    short_name: Option<String>,
    #[serde(rename = "type")]
    dialect: Option<String>,
    config: Option<toml::Value>,
    alternate_levels: Option<HashMap<String, Vec<u32>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

pub fn load_config_from_path(path: &Path) -> Result<RootConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<RootConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/router-gatewayd/config.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<RootConfig, ConfigError> {
    let raw: RawRootConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let log_level = match raw.log_level.as_deref() {
        None => LogLevel::Info,
        Some("trace") => LogLevel::Trace,
        Some("debug") => LogLevel::Debug,
        Some("info") => LogLevel::Info,
        Some("warn") => LogLevel::Warn,
        Some("error") => LogLevel::Error,
        Some("fatal") => LogLevel::Fatal,
        Some("panic") => LogLevel::Panic,
        Some(other) => {
            return Err(ConfigError::InvalidValue(format!(
                "log_level must be one of trace/debug/info/warn/error/fatal/panic, got '{other}'"
            )));
        }
    };

    let raw_drivers = raw.drivers.unwrap_or_default();
    let mut drivers = Vec::with_capacity(raw_drivers.len());
    let mut seen_ids = std::collections::HashSet::new();
    for (i, d) in raw_drivers.into_iter().enumerate() {
        let id = d
            .id
            .ok_or_else(|| ConfigError::MissingField(format!("drivers[{i}].id")))?;
        if !seen_ids.insert(id) {
            return Err(ConfigError::InvalidValue(format!(
                "duplicate driver id {id}"
            )));
        }
        let dialect = d
            .dialect
            .ok_or_else(|| ConfigError::MissingField(format!("drivers[{i}].type")))?;
        if dialect.is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "drivers[{i}].type must not be empty"
            )));
        }
        drivers.push(DriverConfig {
            id,
            display_name: d.display_name.unwrap_or_default(),
            short_name: d.short_name.unwrap_or_default(),
            dialect,
            config: d.config.unwrap_or_else(|| toml::Value::Table(Default::default())),
            alternate_levels: d.alternate_levels.unwrap_or_default(),
        });
    }

    Ok(RootConfig { log_level, drivers })
}
