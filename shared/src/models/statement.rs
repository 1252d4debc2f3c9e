//! Statement models.
//!
//! A `RawStatement` is what a query source emits; a `ResolvedStatement` is the
//! formatted SQL paired with the database it will be explained against.

use super::connection::ConnectionDescriptor;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Where a statement came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Passed literally on the command line.
    Argument,

    /// Read from a log file; 1-based number of the entry's first line.
    Line(usize),

    /// Read from a database's query log.
    LogEntry {
        /// 0-based position in retrieval order.
        index: usize,
        /// Host the entry was read from.
        host: String,
        /// `event_time` recorded by the server, when available.
        event_time: Option<NaiveDateTime>,
    },
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Argument => write!(f, "argument"),
            Self::Line(line) => write!(f, "line {line}"),
            Self::LogEntry {
                index,
                host,
                event_time: Some(time),
            } => write!(f, "{host} log entry {index} ({time})"),
            Self::LogEntry { index, host, .. } => write!(f, "{host} log entry {index}"),
        }
    }
}

/// Unformatted statement text as read from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement {
    /// The raw text: a log line, a joined log entry or a literal SQL string.
    pub text: String,
    /// Where the text came from.
    pub provenance: Provenance,
}

impl RawStatement {
    /// Creates a raw statement.
    #[must_use]
    pub fn new(text: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            text: text.into(),
            provenance,
        }
    }
}

/// A formatted SQL statement bound to its target database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStatement {
    /// Bare SQL text.
    pub sql: String,
    /// Where the original raw statement came from.
    pub provenance: Provenance,
    /// Database to run EXPLAIN against.
    pub target: ConnectionDescriptor,
}
