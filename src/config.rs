//! Server configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file named
//! by `SCAUDIT_CONFIG`, then `SCAUDIT_*` environment variables. Invalid
//! environment values fall back to the layer below without crashing; an
//! unreadable or malformed config file is an error.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `SCAUDIT_CONFIG` | unset | Path to a TOML config file |
//! | `SCAUDIT_BASE_MODEL` | `models/base` | Base model directory |
//! | `SCAUDIT_ADAPTER` | `models/adapter` | Adapter directory (empty = none) |
//! | `SCAUDIT_DEVICE` | `auto` | `auto`, `cpu`, `cuda` or `metal` |
//! | `SCAUDIT_THRESHOLD` | 0.5 | Default label threshold |
//! | `SCAUDIT_MAX_LENGTH` | 512 | Default truncation length (tokens) |
//! | `SCAUDIT_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |
//! | `SCAUDIT_LOG_FORMAT` | `json` | `json` or `pretty` |
//! | `SCAUDIT_LOG_LEVEL` | `info` | Log filter directives |
//! | `SCAUDIT_LOG_FILE` | unset | Log file (stderr when unset) |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{DevicePreference, PredictParams, DEFAULT_MAX_LENGTH, DEFAULT_THRESHOLD};
use crate::telemetry::{LogConfig, LogFormat};

const DEFAULT_BASE_MODEL: &str = "models/base";
const DEFAULT_ADAPTER: &str = "models/adapter";
const DEFAULT_SHUTDOWN_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Fully resolved server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServeConfig {
    pub base_model_path: PathBuf,
    pub adapter_path: Option<PathBuf>,
    pub device: DevicePreference,
    pub predict: PredictParams,
    pub shutdown_timeout: Duration,
    pub log: LogConfig,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            base_model_path: PathBuf::from(DEFAULT_BASE_MODEL),
            adapter_path: Some(PathBuf::from(DEFAULT_ADAPTER)),
            device: DevicePreference::Auto,
            predict: PredictParams::new(DEFAULT_THRESHOLD, DEFAULT_MAX_LENGTH),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_SECS),
            log: LogConfig::default(),
        }
    }
}

/// Serializable summary of the effective values.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub base_model_path: PathBuf,
    pub adapter_path: Option<PathBuf>,
    pub device: String,
    pub threshold: f32,
    pub max_length: usize,
    pub shutdown_timeout_secs: u64,
    pub log_format: LogFormat,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl ServeConfig {
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            base_model_path: self.base_model_path.clone(),
            adapter_path: self.adapter_path.clone(),
            device: format!("{:?}", self.device).to_ascii_lowercase(),
            threshold: self.predict.threshold,
            max_length: self.predict.max_length,
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
            log_format: self.log.format,
            log_level: self.log.level.clone(),
            log_file: self.log.output_path.clone(),
        }
    }
}

/// On-disk TOML layout. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_model: Option<PathBuf>,
    adapter: Option<PathBuf>,
    device: Option<String>,
    threshold: Option<f32>,
    max_length: Option<usize>,
    shutdown_timeout_secs: Option<u64>,
    #[serde(default)]
    log: FileLogConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileLogConfig {
    format: Option<LogFormat>,
    level: Option<String>,
    file: Option<PathBuf>,
}

/// Load configuration from defaults, `SCAUDIT_CONFIG` and the environment.
pub fn load() -> Result<ServeConfig, ConfigError> {
    let file = std::env::var_os("SCAUDIT_CONFIG")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    load_from(file.as_deref())
}

/// Load configuration with an explicit config file (if any), then apply
/// environment overrides.
pub fn load_from(file: Option<&Path>) -> Result<ServeConfig, ConfigError> {
    let mut config = ServeConfig::default();
    if let Some(path) = file {
        apply_file(&mut config, path)?;
    }
    apply_env(&mut config);
    Ok(config)
}

fn apply_file(config: &mut ServeConfig, path: &Path) -> Result<(), ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: FileConfig = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(base) = file.base_model {
        config.base_model_path = base;
    }
    if let Some(adapter) = file.adapter {
        config.adapter_path = non_empty(adapter);
    }
    if let Some(device) = file.device {
        config.device = device.parse().map_err(ConfigError::Invalid)?;
    }
    let predict = PredictParams::new(
        file.threshold.unwrap_or(config.predict.threshold),
        file.max_length.unwrap_or(config.predict.max_length),
    );
    predict
        .validate()
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    config.predict = predict;
    if let Some(secs) = file.shutdown_timeout_secs {
        config.shutdown_timeout = Duration::from_secs(secs.max(1));
    }
    if let Some(format) = file.log.format {
        config.log.format = format;
    }
    if let Some(level) = file.log.level {
        config.log.level = level;
    }
    if let Some(log_file) = file.log.file {
        config.log.output_path = Some(log_file);
    }
    Ok(())
}

fn apply_env(config: &mut ServeConfig) {
    if let Some(base) = env_string("SCAUDIT_BASE_MODEL").filter(|s| !s.is_empty()) {
        config.base_model_path = PathBuf::from(base);
    }
    if let Some(adapter) = env_string("SCAUDIT_ADAPTER") {
        config.adapter_path = non_empty(PathBuf::from(adapter));
    }
    config.device = parse_env("SCAUDIT_DEVICE", config.device);

    let threshold = parse_env("SCAUDIT_THRESHOLD", config.predict.threshold);
    if PredictParams::new(threshold, config.predict.max_length).validate().is_ok() {
        config.predict.threshold = threshold;
    }
    let max_length = parse_env("SCAUDIT_MAX_LENGTH", config.predict.max_length);
    if PredictParams::new(config.predict.threshold, max_length).validate().is_ok() {
        config.predict.max_length = max_length;
    }

    let secs = parse_env("SCAUDIT_SHUTDOWN_TIMEOUT", config.shutdown_timeout.as_secs());
    config.shutdown_timeout = Duration::from_secs(secs.max(1));

    config.log.format = parse_env("SCAUDIT_LOG_FORMAT", config.log.format);
    if let Some(level) = env_string("SCAUDIT_LOG_LEVEL").filter(|s| !s.is_empty()) {
        config.log.level = level;
    }
    if let Some(file) = env_string("SCAUDIT_LOG_FILE").filter(|s| !s.is_empty()) {
        config.log.output_path = Some(PathBuf::from(file));
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string())
}

/// Parse an env var, returning `current` on missing or invalid.
fn parse_env<T: std::str::FromStr>(key: &str, current: T) -> T {
    match env_string(key) {
        Some(val) => val.parse::<T>().unwrap_or(current),
        None => current,
    }
}

fn non_empty(path: PathBuf) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}
