use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified otherwise).
    Auto,
    /// With colors.
    Pretty,
    /// Simplified log output.
    Simplified,
    /// Dump out JSON lines.
    Json,
}

/// The log level threshold.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Controls the logging system.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the server.
    pub level: LogLevel,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LogLevel::Info,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// The server configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host and port the HTTP server binds to.
    pub bind: String,

    /// Directory the cached objects are stored under. Created on startup if
    /// it does not exist.
    pub storage_dir: PathBuf,

    /// Base URL of the upstream mirror that misses are filled from.
    pub upstream: String,

    /// Advisory cache capacity in megabytes.
    ///
    /// Reported by the stats endpoint; the cache itself never enforces it
    /// and has no eviction.
    pub cache_size_mb: u64,

    /// Maximum time to establish a connection to the upstream.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Maximum time for one complete download from the upstream.
    #[serde(with = "humantime_serde")]
    pub max_download_timeout: Duration,

    /// Controls the logging system.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "0.0.0.0:8080".to_owned(),
            storage_dir: PathBuf::from("./storage"),
            upstream: "https://mirrors.tuna.tsinghua.edu.cn".to_owned(),
            cache_size_mb: 10240,
            connect_timeout: Duration::from_secs(15),
            max_download_timeout: Duration::from_secs(315),
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from the given file, or the defaults when no
    /// path is given.
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        serde_yaml::from_reader(reader).context("failed to parse YAML")
    }
}
