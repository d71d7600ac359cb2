use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{BatchliteError, Result};

/// Number of pending write operations that triggers an automatic commit.
pub const DEFAULT_COMMIT_INTERVAL: u64 = 30_000;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub log: Option<LogConfig>,
}

/// Policy applied when a statement inside a batch fails.
///
/// By default the failure is logged, recorded in the batch outcome, and
/// the rest of the batch keeps executing; `AbortOnFirstError` surfaces
/// the first failure immediately, leaving the already-executed prefix
/// inside the still-open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchErrorPolicy {
    #[default]
    ContinueOnError,
    AbortOnFirstError,
}

/// Database construction parameters.
///
/// `enable_journal = false` and `enable_synchronous = false` are the
/// defaults, trading crash-durability for write throughput.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Keep SQLite journaling enabled (`PRAGMA journal_mode`).
    pub enable_journal: bool,
    /// Keep synchronous writes enabled (`PRAGMA synchronous`).
    pub enable_synchronous: bool,
    /// Optional bootstrap script of semicolon-separated statements,
    /// executed once before the main connection opens.
    pub init_script: Option<PathBuf>,
    /// Optional page-size pragma prepended to the bootstrap script.
    pub page_size: Option<u32>,
    /// Pending-operation count that triggers an automatic commit.
    pub commit_interval: u64,
    /// What to do when a statement inside a batch fails.
    pub batch_error_policy: BatchErrorPolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::new(),
            enable_journal: false,
            enable_synchronous: false,
            init_script: None,
            page_size: None,
            commit_interval: DEFAULT_COMMIT_INTERVAL,
            batch_error_policy: BatchErrorPolicy::default(),
        }
    }
}

impl DatabaseConfig {
    /// Creates a configuration for the database at `path` with defaults
    /// for everything else.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        DatabaseConfig {
            path: path.into(),
            ..DatabaseConfig::default()
        }
    }

    /// Sets the bootstrap script executed before the main connection opens.
    pub fn with_init_script<P: Into<PathBuf>>(mut self, script: P) -> Self {
        self.init_script = Some(script.into());
        self
    }

    /// Sets the automatic commit threshold.
    pub fn with_commit_interval(mut self, interval: u64) -> Self {
        self.commit_interval = interval;
        self
    }
}

/// Logging sink configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Emit log lines to the console.
    pub console: bool,
    /// Maximum level recorded, as a tracing level name ("error", "warn",
    /// "info", "debug", "trace").
    pub level: String,
    /// Base path for the rotating log file; file logging is off when unset.
    pub file: Option<PathBuf>,
    /// Append to the newest existing segment instead of starting a new one.
    pub append: bool,
    /// Size in bytes after which the current segment is rotated out.
    pub max_file_size: u64,
    /// Number of rotated segments kept on disk (0 = unlimited).
    pub max_segments: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            console: true,
            level: "error".to_string(),
            file: None,
            append: true,
            max_file_size: 10_000_000,
            max_segments: 20,
        }
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| BatchliteError::Config(e.to_string()))
}
