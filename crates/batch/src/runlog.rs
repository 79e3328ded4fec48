//! Run log module for wav2flac
//!
//! Every run writes to its own temporary sink file. Worker threads share a
//! [`RunLog`] handle; worker processes re-open the sink by path with
//! [`RunLog::attach`]. Each line goes out in a single append-mode write, so
//! concurrent writers interleave at line granularity only. When the run ends,
//! [`RunLogSession::finish`] appends the sink to the dated master log and
//! removes it.

use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Timestamp layout at the start of every line
const LINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Date layout used in sink and master log names
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors opening a run log sink.
#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("Failed to create log directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to open run log {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
}

/// Errors merging the sink into the master log. The sink is left on disk.
#[derive(Debug, Error)]
pub enum LogMergeError {
    #[error("Failed to read run log {sink}: {source}")]
    Read { sink: PathBuf, source: io::Error },

    #[error("Failed to append run log {sink} to {master}: {source}")]
    Append {
        sink: PathBuf,
        master: PathBuf,
        source: io::Error,
    },

    #[error("Failed to remove run log {sink} after merge: {source}")]
    Remove { sink: PathBuf, source: io::Error },
}

impl LogMergeError {
    /// The preserved temporary sink
    pub fn sink(&self) -> &Path {
        match self {
            LogMergeError::Read { sink, .. }
            | LogMergeError::Append { sink, .. }
            | LogMergeError::Remove { sink, .. } => sink,
        }
    }
}

/// Severity of a run log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

/// Format one log line, newline-terminated.
///
/// Continuation lines of a multi-line message are tab-indented so the record
/// stays visually attached to its timestamp.
pub fn format_line(at: DateTime<Local>, level: Level, message: &str) -> String {
    let body = message.trim_end().replace('\n', "\n\t");
    format!(
        "{} - {} - {}\n",
        at.format(LINE_TIMESTAMP_FORMAT),
        level.as_str(),
        body
    )
}

/// Append-only handle onto a run's sink file
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
    file: Arc<File>,
}

impl RunLog {
    fn open(path: &Path, create_new: bool) -> Result<Self, RunLogError> {
        let mut options = OpenOptions::new();
        options.append(true);
        if create_new {
            options.create_new(true);
        }
        let file = options.open(path).map_err(|source| RunLogError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(file),
        })
    }

    /// Attach to an existing sink by path (used by worker processes)
    pub fn attach(path: &Path) -> Result<Self, RunLogError> {
        Self::open(path, false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line and mirror it to the console
    pub fn record(&self, level: Level, message: &str) {
        match level {
            Level::Info => tracing::info!(target: "wav2flac::run", "{}", message),
            Level::Warning => tracing::warn!(target: "wav2flac::run", "{}", message),
            Level::Error => tracing::error!(target: "wav2flac::run", "{}", message),
        }

        let line = format_line(Local::now(), level, message);
        if let Err(e) = (&*self.file).write_all(line.as_bytes()) {
            tracing::warn!(path = %self.path.display(), error = %e, "Run log write failed");
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.record(Level::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.record(Level::Warning, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.record(Level::Error, message.as_ref());
    }
}

/// Lifecycle of one run's log: temporary sink now, master log at the end
#[derive(Debug)]
pub struct RunLogSession {
    id: Uuid,
    started_at: DateTime<Local>,
    log_dir: PathBuf,
    log: RunLog,
}

impl RunLogSession {
    /// Create a fresh sink `temp_<date>_<id>.txt` in `log_dir`
    pub fn start(log_dir: &Path) -> Result<Self, RunLogError> {
        fs::create_dir_all(log_dir).map_err(|source| RunLogError::CreateDir {
            path: log_dir.to_path_buf(),
            source,
        })?;

        let id = Uuid::new_v4();
        let started_at = Local::now();
        let sink_path = log_dir.join(format!(
            "temp_{}_{}.txt",
            started_at.format(DATE_FORMAT),
            id.simple()
        ));
        let log = RunLog::open(&sink_path, true)?;

        Ok(Self {
            id,
            started_at,
            log_dir: log_dir.to_path_buf(),
            log,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn sink_path(&self) -> &Path {
        self.log.path()
    }

    /// Master log for the run's start date
    pub fn master_path(&self) -> PathBuf {
        self.log_dir
            .join(format!("{}.txt", self.started_at.format(DATE_FORMAT)))
    }

    /// Close the sink, append it to the master log, and delete it.
    ///
    /// Must only be called once the worker pool has drained. On error the
    /// sink stays on disk and its path is carried in the error.
    pub fn finish(self) -> Result<PathBuf, LogMergeError> {
        let master = self.master_path();
        let sink = self.log.path().to_path_buf();
        drop(self.log);

        let mut contents = fs::read(&sink).map_err(|source| LogMergeError::Read {
            sink: sink.clone(),
            source,
        })?;
        contents.push(b'\n');

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&master)
            .and_then(|mut file| file.write_all(&contents))
            .map_err(|source| LogMergeError::Append {
                sink: sink.clone(),
                master: master.clone(),
                source,
            })?;

        fs::remove_file(&sink).map_err(|source| LogMergeError::Remove {
            sink: sink.clone(),
            source,
        })?;

        Ok(master)
    }
}
