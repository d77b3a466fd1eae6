//! The per-run append-only log.
//!
//! Every run writes one file, `<site>-<operation>-<stamp>.log`, holding one
//! line per step outcome, one per rollback handler, and a terminal line.
//! Records are never rewritten once appended.

use crate::utils::{file_stamp, Timestamp};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Severity of a run log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational.
    Info,
    /// Something succeeded.
    Ok,
    /// Something failed but the run continues.
    Warn,
    /// Something failed fatally.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Ok => write!(f, "OK"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Self::Info),
            "OK" => Ok(Self::Ok),
            "WARN" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// One line of the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// When the record was created.
    pub timestamp: Timestamp,
    /// Severity.
    pub level: LogLevel,
    /// Single-line message.
    pub message: String,
}

impl LogRecord {
    /// Creates a record stamped with the current time.
    ///
    /// Newlines in the message are folded so one record is always one line.
    /// The timestamp is truncated to the millisecond precision of the file
    /// format.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            timestamp: Utc::now().trunc_subsecs(3),
            level,
            message: message.replace(['\r', '\n'], " | "),
        }
    }

    /// Renders the record as `<timestamp> [LEVEL] message`.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!(
            "{} [{}] {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level,
            self.message
        )
    }

    /// Parses a line produced by [`LogRecord::to_line`].
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let (stamp, rest) = line.split_once(' ')?;
        let rest = rest.strip_prefix('[')?;
        let (level, message) = rest.split_once("] ")?;
        Some(Self {
            timestamp: DateTime::parse_from_rfc3339(stamp).ok()?.with_timezone(&Utc),
            level: level.parse().ok()?,
            message: message.to_string(),
        })
    }
}

/// Append-only record store for one run.
///
/// Records are kept in memory and, when the log is file-backed, appended to
/// the file and flushed immediately.
#[derive(Debug)]
pub struct RunLog {
    path: Option<PathBuf>,
    file: Option<File>,
    records: Vec<LogRecord>,
}

impl RunLog {
    /// Creates a log that is never written to disk.
    #[must_use]
    pub const fn in_memory() -> Self {
        Self {
            path: None,
            file: None,
            records: Vec::new(),
        }
    }

    /// Creates a new timestamped log file in `dir`.
    ///
    /// The file is named `<site>-<operation>-<stamp>.log`; the directory is
    /// created if needed.
    pub fn create(dir: &Path, site: &str, operation: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stem = format!("{site}-{operation}-{}", file_stamp(Utc::now()));
        let mut path = dir.join(format!("{stem}.log"));
        let mut counter = 1;
        while path.exists() {
            path = dir.join(format!("{stem}-{counter}.log"));
            counter += 1;
        }
        Self::open(path)
    }

    /// Opens (or creates) a log file at an explicit path in append mode.
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path: Some(path),
            file: Some(file),
            records: Vec::new(),
        })
    }

    /// Appends a record.
    ///
    /// The record is kept in memory even if writing the file fails.
    pub fn append(&mut self, record: LogRecord) -> io::Result<()> {
        let line = record.to_line();
        self.records.push(record);
        if let Some(file) = self.file.as_mut() {
            writeln!(file, "{line}")?;
            file.flush()?;
        }
        Ok(())
    }

    /// Records appended so far.
    #[must_use]
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Path of the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Reads every parseable record from a log file.
    pub fn read_file(path: &Path) -> io::Result<Vec<LogRecord>> {
        let content = fs::read_to_string(path)?;
        Ok(content.lines().filter_map(LogRecord::parse_line).collect())
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::in_memory()
    }
}
