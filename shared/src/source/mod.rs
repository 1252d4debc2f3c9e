//! Query sources.
//!
//! A source produces the raw statements of a run on one channel and reports
//! source-level failures on a second one. Both channels are closed when the
//! source is exhausted, fails fatally or observes cancellation; closure is the
//! end-of-stream signal for the orchestrator.
//!
//! - [`QuerySource::Single`]: one literal statement
//! - [`QuerySource::LogFile`]: a log file, line by line or entry by entry
//! - [`QuerySource::DatabaseLog`]: the query log kept by the database servers

mod database_log;
mod log_file;

pub use database_log::{LogRecord, StatementLog};
pub use log_file::EntryMode;

use crate::models::{ConnectionDescriptor, Provenance, RawStatement};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of the channels between pipeline stages.
pub const CHANNEL_CAPACITY: usize = 64;

/// Errors reported by a query source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The log file could not be opened or read.
    #[error("Cannot read log file {}: {source}", .path.display())]
    Io {
        /// Log file location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The database holding the query log could not be reached.
    #[error("Cannot connect to {target}: {message}")]
    Connect {
        /// Database that was contacted.
        target: String,
        /// Driver error message.
        message: String,
    },

    /// The query log could not be retrieved.
    #[error("Cannot read query log of {target}: {message}")]
    Query {
        /// Database that was queried.
        target: String,
        /// Driver error message.
        message: String,
    },

    /// One retrieved entry could not be decoded. The other entries are unaffected.
    #[error("Cannot decode query log entry {index} of {target}: {message}")]
    Decode {
        /// Database the entry came from.
        target: String,
        /// Position of the entry in retrieval order.
        index: usize,
        /// Decoding error message.
        message: String,
    },
}

impl SourceError {
    /// Returns true if the error ends the source (and the run).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode { .. })
    }
}

/// Receiving ends of a running source.
#[derive(Debug)]
pub struct SourceChannels {
    /// Raw statements in source order.
    pub statements: mpsc::Receiver<RawStatement>,
    /// Source-level failures.
    pub errors: mpsc::Receiver<SourceError>,
}

/// Where the statements of a run come from.
#[derive(Clone)]
pub enum QuerySource {
    /// One statement given literally.
    Single(String),

    /// A log file.
    LogFile {
        /// Log file location.
        path: PathBuf,
        /// How lines are grouped into statements.
        entries: EntryMode,
    },

    /// The query log of one or more database servers, read in order.
    DatabaseLog {
        /// Capability used to fetch the log.
        log: Arc<dyn StatementLog>,
        /// Servers to read from.
        targets: Vec<ConnectionDescriptor>,
    },
}

impl std::fmt::Debug for QuerySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(sql) => f.debug_tuple("Single").field(sql).finish(),
            Self::LogFile { path, entries } => f
                .debug_struct("LogFile")
                .field("path", path)
                .field("entries", entries)
                .finish(),
            Self::DatabaseLog { targets, .. } => f
                .debug_struct("DatabaseLog")
                .field("targets", targets)
                .finish_non_exhaustive(),
        }
    }
}

impl QuerySource {
    /// Starts the source on a new task.
    ///
    /// The task stops emitting as soon as `cancel` fires; no file read or log
    /// fetch is started afterwards.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> (SourceChannels, JoinHandle<()>) {
        let (statement_tx, statements) = mpsc::channel(CHANNEL_CAPACITY);
        let (error_tx, errors) = mpsc::channel(CHANNEL_CAPACITY);
        let emitter = Emitter {
            statements: statement_tx,
            errors: error_tx,
            cancel,
        };

        let handle = tokio::spawn(async move {
            match self {
                Self::Single(sql) => {
                    emitter
                        .emit(RawStatement::new(sql, Provenance::Argument))
                        .await;
                }
                Self::LogFile { path, entries } => {
                    log_file::read(&path, entries, &emitter).await;
                }
                Self::DatabaseLog { log, targets } => {
                    database_log::read(log.as_ref(), &targets, &emitter).await;
                }
            }
            tracing::debug!("Query source finished");
        });

        (SourceChannels { statements, errors }, handle)
    }
}

/// Sending side shared by the source implementations.
pub(crate) struct Emitter {
    statements: mpsc::Sender<RawStatement>,
    errors: mpsc::Sender<SourceError>,
    cancel: CancellationToken,
}

impl Emitter {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Sends a statement downstream. Returns false once the source must stop.
    pub(crate) async fn emit(&self, statement: RawStatement) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.statements.send(statement) => sent.is_ok(),
        }
    }

    /// Reports a source error. Returns false once the source must stop.
    pub(crate) async fn report(&self, error: SourceError) -> bool {
        tracing::warn!(error = %error, fatal = error.is_fatal(), "Query source error");
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.errors.send(error) => sent.is_ok(),
        }
    }
}
