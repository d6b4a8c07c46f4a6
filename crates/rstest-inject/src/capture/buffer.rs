//! Thread-safe buffering of captured log records.

use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Severity of a captured record, unified across backends.
///
/// Variants are ordered most severe first, so a record passes a threshold
/// when `record.level <= threshold`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CaptureLevel {
    /// Unrecoverable failures.
    Error,
    /// Suspicious conditions worth surfacing.
    Warn,
    /// High-level progress messages.
    Info,
    /// Diagnostic detail.
    Debug,
    /// Very fine-grained tracing.
    Trace,
}

impl CaptureLevel {
    /// Canonical upper-case name of the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    /// Parse a level token case-insensitively.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let trimmed = token.trim();
        [
            Self::Error,
            Self::Warn,
            Self::Info,
            Self::Debug,
            Self::Trace,
        ]
        .into_iter()
        .find(|level| trimmed.eq_ignore_ascii_case(level.as_str()))
    }
}

impl fmt::Display for CaptureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<log::Level> for CaptureLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

/// One intercepted log record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedRecord {
    /// Severity the record was logged at.
    pub level: CaptureLevel,
    /// Logger scope the record was addressed to.
    pub target: String,
    /// Rendered message text.
    pub message: String,
}

impl CapturedRecord {
    /// Construct a record.
    #[must_use]
    pub fn new(level: CaptureLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            target: target.into(),
            message: message.into(),
        }
    }
}

/// Ordered buffer of captured records behind one coarse lock.
///
/// `push`, `snapshot`, and `clear` are each atomic with respect to the
/// others, so appends racing a snapshot are either fully visible or not at
/// all. Snapshots are defensive copies: a later append never mutates a list
/// already handed to a caller. Clearing an empty buffer is a no-op.
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    records: Mutex<Vec<CapturedRecord>>,
}

impl CaptureBuffer {
    /// Construct an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the end of the buffer.
    pub fn push(&self, record: CapturedRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Copy the current contents, in append order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CapturedRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Discard every buffered record.
    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of buffered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Return `true` when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
