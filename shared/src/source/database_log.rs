//! Database query-log source.

use super::{Emitter, SourceError};
use crate::models::{ConnectionDescriptor, Provenance, RawStatement};
use async_trait::async_trait;
use chrono::NaiveDateTime;

/// One statement retrieved from a server's query log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Statement text as logged.
    pub sql: String,
    /// When the server logged it.
    pub event_time: Option<NaiveDateTime>,
}

impl LogRecord {
    /// Creates a record without an event time.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            event_time: None,
        }
    }

    /// Sets the event time.
    #[must_use]
    pub fn with_event_time(mut self, event_time: Option<NaiveDateTime>) -> Self {
        self.event_time = event_time;
        self
    }
}

/// Access to the statement log kept by a database server.
#[async_trait]
pub trait StatementLog: Send + Sync {
    /// Retrieves a snapshot of the logged statements of `target`, in log order.
    ///
    /// Entries that cannot be decoded are returned as errors in place so the
    /// remaining entries are still delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or the log cannot be
    /// queried.
    async fn fetch(
        &self,
        target: &ConnectionDescriptor,
    ) -> Result<Vec<Result<LogRecord, SourceError>>, SourceError>;
}

/// Reads the log of every target in order and emits its statements.
///
/// A failed fetch is fatal and ends the source; undecodable entries are
/// reported and skipped.
pub(super) async fn read(log: &dyn StatementLog, targets: &[ConnectionDescriptor], emitter: &Emitter) {
    for target in targets {
        if emitter.is_cancelled() {
            return;
        }

        let fetched = tokio::select! {
            biased;
            () = emitter.cancel_token().cancelled() => return,
            fetched = log.fetch(target) => fetched,
        };

        let records = match fetched {
            Ok(records) => records,
            Err(error) => {
                emitter.report(error).await;
                return;
            }
        };
        tracing::info!(host = %target.host, entries = records.len(), "Fetched query log");

        for (index, record) in records.into_iter().enumerate() {
            let keep_going = match record {
                Ok(record) => {
                    let provenance = Provenance::LogEntry {
                        index,
                        host: target.host.clone(),
                        event_time: record.event_time,
                    };
                    emitter.emit(RawStatement::new(record.sql, provenance)).await
                }
                Err(error) => emitter.report(error).await,
            };
            if !keep_going {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::QuerySource;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct ScriptedLog {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl StatementLog for ScriptedLog {
        async fn fetch(
            &self,
            target: &ConnectionDescriptor,
        ) -> Result<Vec<Result<LogRecord, SourceError>>, SourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match target.host.as_str() {
                "down" => Err(SourceError::Connect {
                    target: target.to_string(),
                    message: "connection refused".into(),
                }),
                _ => Ok(vec![
                    Ok(LogRecord::new("SELECT 1")),
                    Err(SourceError::Decode {
                        target: target.to_string(),
                        index: 1,
                        message: "invalid utf-8".into(),
                    }),
                    Ok(LogRecord::new("SELECT 2")),
                ]),
            }
        }
    }

    fn target(host: &str) -> ConnectionDescriptor {
        ConnectionDescriptor::new(host, "app", "root", "")
    }

    #[tokio::test]
    async fn test_decode_errors_do_not_stop_the_source() {
        let log = Arc::new(ScriptedLog {
            fetches: AtomicUsize::new(0),
        });
        let source = QuerySource::DatabaseLog {
            log: log.clone(),
            targets: vec![target("db1"), target("db2")],
        };

        let (mut channels, handle) = source.spawn(CancellationToken::new());
        let mut statements = Vec::new();
        while let Some(statement) = channels.statements.recv().await {
            statements.push(statement);
        }
        let mut errors = Vec::new();
        while let Some(error) = channels.errors.recv().await {
            errors.push(error);
        }
        handle.await.unwrap();

        assert_eq!(statements.len(), 4);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| !e.is_fatal()));
        assert_eq!(log.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(
            statements[3].provenance,
            Provenance::LogEntry {
                index: 2,
                host: "db2".into(),
                event_time: None
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fatal_and_stops() {
        let log = Arc::new(ScriptedLog {
            fetches: AtomicUsize::new(0),
        });
        let source = QuerySource::DatabaseLog {
            log: log.clone(),
            targets: vec![target("down"), target("db2")],
        };

        let (mut channels, handle) = source.spawn(CancellationToken::new());
        let error = channels.errors.recv().await.unwrap();
        assert!(error.is_fatal());
        assert!(channels.statements.recv().await.is_none());
        handle.await.unwrap();

        assert_eq!(log.fetches.load(Ordering::SeqCst), 1);
    }
}
