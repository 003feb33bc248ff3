//! Worker configuration from environment variables.
//!
//! # Invariants
//! - Every variable is optional; unset or blank values fall back to defaults.
//! - Set but malformed values are rejected, never silently defaulted.

use crate::db::DEFAULT_LOCK_TIMEOUT;
use crate::logging::default_log_level;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "PIBBLE_DB_PATH";
pub const ENV_INTERVAL_SECONDS: &str = "WORKER_INTERVAL_SECONDS";
pub const ENV_ONCE: &str = "WORKER_ONCE";
pub const ENV_LOG_LEVEL: &str = "PIBBLE_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "PIBBLE_LOG_DIR";
pub const ENV_LOCK_TIMEOUT_MS: &str = "PIBBLE_LOCK_TIMEOUT_MS";

const DEFAULT_DB_PATH: &str = "pibble.db";
const DEFAULT_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_LOG_DIR_NAME: &str = "pibble-logs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidNumber { key: &'static str, value: String },
    ZeroInterval,
    InvalidFlag { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer, got `{value}`")
            }
            Self::ZeroInterval => write!(f, "{ENV_INTERVAL_SECONDS} must be greater than 0"),
            Self::InvalidFlag { key, value } => {
                write!(f, "{key} must be one of 0|1|true|false, got `{value}`")
            }
        }
    }
}

impl Error for ConfigError {}

/// Settings for the penalty worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub database_path: PathBuf,
    pub interval: Duration,
    /// Run a single sweep and exit.
    pub once: bool,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub lock_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECONDS),
            once: false,
            log_level: default_log_level().to_string(),
            log_dir: std::env::temp_dir().join(DEFAULT_LOG_DIR_NAME),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = value(ENV_DB_PATH) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(raw) = value(ENV_INTERVAL_SECONDS) {
            let seconds = parse_u64(ENV_INTERVAL_SECONDS, &raw)?;
            if seconds == 0 {
                return Err(ConfigError::ZeroInterval);
            }
            config.interval = Duration::from_secs(seconds);
        }
        if let Some(raw) = value(ENV_ONCE) {
            config.once = parse_flag(ENV_ONCE, &raw)?;
        }
        if let Some(level) = value(ENV_LOG_LEVEL) {
            config.log_level = level;
        }
        if let Some(dir) = value(ENV_LOG_DIR) {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(raw) = value(ENV_LOCK_TIMEOUT_MS) {
            config.lock_timeout = Duration::from_millis(parse_u64(ENV_LOCK_TIMEOUT_MS, &raw)?);
        }

        Ok(config)
    }
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: raw.to_string(),
    })
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            key,
            value: raw.to_string(),
        }),
    }
}
