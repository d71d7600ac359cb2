//! Logging sinks for batchlite.
//!
//! Call sites log through `tracing` macros; this module installs the
//! subscriber (console and/or rotating file) and provides the
//! `log_event` entry point for callers that deal in the classic
//! `(component, message, level)` shape.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogConfig;
use crate::core::{BatchliteError, Result};

/// Number of writes between file-size re-checks.
const CHECK_INTERVAL: u32 = 20;
/// Timestamp embedded in rotated segment names.
const SEGMENT_TS_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Event severity for `log_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Information,
    Warning,
    Critical,
    Error,
}

/// Records an event for the given component at the given level.
///
/// Delivery is synchronous and ordered per sink; the call never blocks
/// beyond the write to the enabled sinks.
pub fn log_event(component: &str, message: &str, level: LogLevel) {
    match level {
        LogLevel::Debug => tracing::debug!(component, "{}", message),
        LogLevel::Information => tracing::info!(component, "{}", message),
        LogLevel::Warning => tracing::warn!(component, "{}", message),
        LogLevel::Critical | LogLevel::Error => tracing::error!(component, "{}", message),
    }
}

/// Installs the global tracing subscriber described by `config`.
///
/// Returns a `Config` error when the level name is unknown or a
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let level: tracing::Level = config
        .level
        .parse()
        .map_err(|_| BatchliteError::Config(format!("unknown log level '{}'", config.level)))?;

    let console_layer = config.console.then(fmt::layer);
    let file_layer = config.file.as_ref().map(|path| {
        let appender = RotatingFileAppender::new(
            path.clone(),
            config.append,
            config.max_file_size,
            config.max_segments,
        );
        fmt::layer().with_ansi(false).with_writer(appender)
    });

    tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| BatchliteError::Config(format!("failed to install log subscriber: {e}")))
}

/// Size-rotated log file writer.
///
/// Segments are named `<stem>.<timestamp>.<ext>` next to the configured
/// base path. The current segment's size is re-checked every
/// `CHECK_INTERVAL` writes; when it exceeds the maximum a new segment is
/// started and segments beyond the retention count are deleted, oldest
/// first.
#[derive(Debug)]
pub struct RotatingFileWriter {
    base: PathBuf,
    append: bool,
    max_size: u64,
    max_segments: usize,
    file: Option<File>,
    current: PathBuf,
    writes_since_check: u32,
}

impl RotatingFileWriter {
    pub fn new(base: PathBuf, append: bool, max_size: u64, max_segments: usize) -> Self {
        RotatingFileWriter {
            base,
            append,
            max_size,
            max_segments,
            file: None,
            current: PathBuf::new(),
            writes_since_check: 0,
        }
    }

    fn stem(&self) -> String {
        self.base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log".to_string())
    }

    fn extension(&self) -> String {
        self.base
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log".to_string())
    }

    fn parent(&self) -> PathBuf {
        match self.base.parent() {
            Some(p) if p != Path::new("") => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn new_segment_path(&self) -> PathBuf {
        let name = format!(
            "{}.{}.{}",
            self.stem(),
            Local::now().format(SEGMENT_TS_FORMAT),
            self.extension()
        );
        self.parent().join(name)
    }

    /// Existing segments for this base name, sorted oldest first. The
    /// timestamp format sorts lexicographically, so a name sort suffices.
    fn existing_segments(&self) -> Vec<PathBuf> {
        let prefix = format!("{}.", self.stem());
        let suffix = format!(".{}", self.extension());
        let mut segments: Vec<PathBuf> = match fs::read_dir(self.parent()) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .map(|n| {
                            let name = n.to_string_lossy();
                            name.starts_with(&prefix) && name.ends_with(&suffix)
                        })
                        .unwrap_or(false)
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        segments.sort();
        segments
    }

    /// Deletes segments beyond the retention count, oldest first.
    fn clean(&self) {
        if self.max_segments == 0 {
            return;
        }
        let segments = self.existing_segments();
        if segments.len() > self.max_segments {
            for old in &segments[..segments.len() - self.max_segments] {
                let _ = fs::remove_file(old);
            }
        }
    }

    fn open(&mut self) -> io::Result<()> {
        self.clean();
        let path = if self.append {
            match self.existing_segments().pop() {
                Some(newest) => {
                    let size = fs::metadata(&newest).map(|m| m.len()).unwrap_or(0);
                    if size > self.max_size {
                        self.new_segment_path()
                    } else {
                        newest
                    }
                }
                None => self.new_segment_path(),
            }
        } else {
            self.new_segment_path()
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        self.file = Some(OpenOptions::new().create(true).append(true).open(&path)?);
        self.current = path;
        self.writes_since_check = 0;
        Ok(())
    }

    /// Re-stats the current segment and rotates when it grew past the
    /// size limit.
    fn check(&mut self) -> io::Result<()> {
        if self.file.is_some() {
            self.file = None;
            let size = fs::metadata(&self.current).map(|m| m.len()).unwrap_or(0);
            if size > self.max_size {
                self.current = self.new_segment_path();
                self.clean();
            }
            self.file = Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.current)?,
            );
        }
        self.writes_since_check = 0;
        Ok(())
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.file.is_none() {
            self.open()?;
        }
        if self.writes_since_check >= CHECK_INTERVAL {
            self.check()?;
        }
        let written = match self.file.as_mut() {
            Some(file) => file.write(buf)?,
            None => 0,
        };
        self.writes_since_check += 1;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Shareable `MakeWriter` over a `RotatingFileWriter`.
#[derive(Clone, Debug)]
pub struct RotatingFileAppender(Arc<Mutex<RotatingFileWriter>>);

impl RotatingFileAppender {
    pub fn new(base: PathBuf, append: bool, max_size: u64, max_segments: usize) -> Self {
        RotatingFileAppender(Arc::new(Mutex::new(RotatingFileWriter::new(
            base,
            append,
            max_size,
            max_segments,
        ))))
    }
}

impl<'a> MakeWriter<'a> for RotatingFileAppender {
    type Writer = RotatingFileHandle;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingFileHandle(self.0.clone())
    }
}

/// Write handle that serializes access to the shared rotating writer.
pub struct RotatingFileHandle(Arc<Mutex<RotatingFileWriter>>);

impl Write for RotatingFileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .flush()
    }
}
