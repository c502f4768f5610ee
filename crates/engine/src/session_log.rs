use chrono::Local;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::jobs::JobRecord;

pub const ADDED_JOB_PREFIX: &str = "Added job: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to parse log entry on line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("failed to read activity log {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Append-only record of what a session did.
///
/// When the file cannot be opened for appending, logging is switched off
/// and every entry is dropped.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: Option<PathBuf>,
}

impl ActivityLog {
    pub fn open(path: &Path) -> Self {
        let writable = OpenOptions::new().create(true).append(true).open(path);
        match writable {
            Ok(_) => Self {
                path: Some(path.to_path_buf()),
            },
            Err(e) => {
                warn!("Activity log {:?} not writable, logging disabled: {}", path, e);
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn entry(&self, level: LogLevel, message: &str) {
        let Some(path) = &self.path else {
            return;
        };
        let timestamp = Local::now().format("%Y-%m-%d|%H:%M:%S").to_string();
        let mut text = String::new();
        // A blank line marks where a session begins
        if message.ends_with("started") {
            text.push('\n');
        }
        text.push_str(&format_entry(&timestamp, level, message));
        text.push('\n');

        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(text.as_bytes()));
        if let Err(e) = written {
            debug!("Dropped activity entry: {}", e);
        }
    }

    pub fn info(&self, message: &str) {
        self.entry(LogLevel::Info, message);
    }

    pub fn critical(&self, message: &str) {
        self.entry(LogLevel::Critical, message);
    }

    pub fn record_job_added(&self, record: &JobRecord) {
        match serde_json::to_string(record) {
            Ok(json) => self.info(&format!("{}{}", ADDED_JOB_PREFIX, json)),
            Err(e) => warn!("Could not serialize job record: {}", e),
        }
    }
}

pub fn format_entry(timestamp: &str, level: LogLevel, message: &str) -> String {
    format!("{} {} {}", timestamp, level, message)
}

pub fn read_all(path: &Path) -> Result<String, ReloadError> {
    std::fs::read_to_string(path).map_err(|source| ReloadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Job records of the most recent session, in the order they were added.
///
/// Walks back from the end of the log, past any trailing blank lines, and
/// stops at the first blank line above them.
pub fn parse_last_session(text: &str) -> Result<Vec<JobRecord>, ReloadError> {
    let lines: Vec<&str> = text.lines().collect();
    let mut records = Vec::new();

    let mut trailing = true;
    for (number, line) in lines.iter().enumerate().rev() {
        if line.trim().is_empty() {
            if trailing {
                continue;
            }
            break;
        }
        trailing = false;

        let Some(pos) = line.find(ADDED_JOB_PREFIX) else {
            continue;
        };
        let json = &line[pos + ADDED_JOB_PREFIX.len()..];
        let record: JobRecord =
            serde_json::from_str(json).map_err(|e| ReloadError::Malformed {
                line: number + 1,
                reason: e.to_string(),
            })?;
        records.push(record);
    }

    records.reverse();
    Ok(records)
}
