/*
 * Configuration management for the event logger
 *
 * This module handles:
 * - Defining the LogLevel enum for severities (Debug, Info, Warn, Error, Critical)
 * - Parsing log options from TOML files
 * - Providing default values for every construction parameter
 * - Resolving the log directory against the running executable
 *
 * Options only matter the first time a log name is acquired; later
 * acquisitions of the same name share the instance configured first.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::{LogError, Result};

/// Log severity levels, least important first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Whether a message at this level passes the `floor`
    pub fn allows(self, floor: LogLevel) -> bool {
        self >= floor
    }

    pub(crate) fn from_index(index: u8) -> LogLevel {
        match index {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            _ => LogLevel::Critical,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "critical" | "crit" => Ok(LogLevel::Critical),
            _ => Err(LogError::Configuration(format!("unknown log level '{}'", s))),
        }
    }
}

// Separate implementation of Deserialize to handle case-insensitive values
impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            serde::de::Error::unknown_variant(
                &s,
                &["debug", "info", "warn", "warning", "error", "critical", "crit"],
            )
        })
    }
}

/// Construction parameters for a log instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogOptions {
    /// Base file name, with or without an extension
    #[serde(default = "default_name")]
    pub name: String,

    /// Folder for the day files, relative paths resolve next to the executable
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Minimum level to record
    #[serde(default = "default_min_level")]
    pub min_level: LogLevel,

    /// Delay between the first queued message and the flush
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Queue length that forces an immediate flush
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

fn default_name() -> String {
    "EventLog".to_string()
}

fn default_directory() -> PathBuf {
    PathBuf::from("Log")
}

fn default_min_level() -> LogLevel {
    LogLevel::Warn
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_max_queue_size() -> usize {
    20
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            name: default_name(),
            directory: default_directory(),
            min_level: default_min_level(),
            flush_interval_ms: default_flush_interval_ms(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

/// Configuration wrapper to handle the [eventlog] section in TOML
#[derive(Debug, Deserialize)]
struct ConfigWrapper {
    eventlog: LogOptions,
}

impl LogOptions {
    /// Default options for the given log name
    pub fn named(name: impl Into<String>) -> Self {
        LogOptions {
            name: name.into(),
            ..LogOptions::default()
        }
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Load options from a TOML file, falling back to defaults if it is missing
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read log config, using defaults");
                return Ok(LogOptions::default());
            }
        };

        Self::from_toml_str(&config_str)
    }

    /// Parse options from TOML, either inside an [eventlog] table or at the top level
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        match toml::from_str::<ConfigWrapper>(config_str) {
            Ok(wrapper) => Ok(wrapper.eventlog),
            Err(e) => toml::from_str::<LogOptions>(config_str).map_err(|_| {
                LogError::Configuration(format!("failed to parse log config: {}", e))
            }),
        }
    }

    /// Absolute directory the day files are written to
    pub fn resolve_directory(&self) -> Result<PathBuf> {
        if self.directory.as_os_str().is_empty() {
            return Err(LogError::Configuration("log directory is empty".to_string()));
        }
        if self.directory.is_absolute() {
            return Ok(self.directory.clone());
        }

        let exe = std::env::current_exe().map_err(|e| {
            LogError::Configuration(format!("cannot locate running executable: {}", e))
        })?;
        let base = exe.parent().ok_or_else(|| {
            LogError::Configuration(format!("executable '{}' has no parent directory", exe.display()))
        })?;
        Ok(base.join(&self.directory))
    }
}
