//! EXPLAIN execution.
//!
//! The [`ExplainDriver`] trait is the seam to the database; the
//! [`ExplainEngine`] runs statements through it, keeping one connection per
//! target database for the lifetime of a run. Failed statements are never
//! retried.

use crate::models::{ConnectionDescriptor, ExplainResult, ExplainRow, ResolvedStatement};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Error reported by a driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DriverError(pub String);

impl DriverError {
    /// Creates a driver error from any message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors that can occur while explaining a single statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExplainError {
    /// The target database could not be reached.
    #[error("Cannot connect to {target}: {message}")]
    Connect {
        /// The database that was contacted.
        target: String,
        /// Driver error message.
        message: String,
    },

    /// The database rejected the EXPLAIN.
    #[error("EXPLAIN failed for `{sql}`: {message}")]
    ExecutionFailed {
        /// The offending SQL text.
        sql: String,
        /// Driver error message.
        message: String,
    },
}

/// Database capability used by the explain engine.
#[async_trait]
pub trait ExplainDriver: Send + Sync {
    /// An open connection.
    type Connection: Send;

    /// Opens a connection to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    async fn connect(&self, target: &ConnectionDescriptor) -> Result<Self::Connection, DriverError>;

    /// Runs EXPLAIN for `sql` and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database rejects the statement.
    async fn explain(
        &self,
        connection: &mut Self::Connection,
        sql: &str,
    ) -> Result<Vec<ExplainRow>, DriverError>;
}

/// Runs EXPLAIN for resolved statements.
pub struct ExplainEngine<D: ExplainDriver> {
    driver: Arc<D>,
    connections: HashMap<ConnectionDescriptor, D::Connection>,
}

impl<D: ExplainDriver> std::fmt::Debug for ExplainEngine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplainEngine")
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

impl<D: ExplainDriver> ExplainEngine<D> {
    /// Creates an engine with no open connections.
    #[must_use]
    pub fn new(driver: Arc<D>) -> Self {
        Self {
            driver,
            connections: HashMap::new(),
        }
    }

    /// Number of cached connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Explains one statement.
    ///
    /// A connection is opened on first use of a target and reused afterwards.
    /// When the driver reports an execution error the connection is dropped,
    /// so the next statement for that target reconnects.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be reached or the database
    /// rejects the statement.
    pub async fn explain(
        &mut self,
        statement: &ResolvedStatement,
    ) -> Result<ExplainResult, ExplainError> {
        let mut connection = match self.connections.remove(&statement.target) {
            Some(connection) => connection,
            None => {
                tracing::debug!(target_db = %statement.target, "Opening connection");
                self.driver
                    .connect(&statement.target)
                    .await
                    .map_err(|e| ExplainError::Connect {
                        target: statement.target.to_string(),
                        message: e.0,
                    })?
            }
        };

        match self.driver.explain(&mut connection, &statement.sql).await {
            Ok(rows) => {
                self.connections
                    .insert(statement.target.clone(), connection);
                Ok(ExplainResult::new(
                    statement.sql.clone(),
                    statement.target.database.clone(),
                    rows,
                ))
            }
            Err(e) => Err(ExplainError::ExecutionFailed {
                sql: statement.sql.clone(),
                message: e.0,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provenance;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingDriver {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl ExplainDriver for CountingDriver {
        type Connection = String;

        async fn connect(&self, target: &ConnectionDescriptor) -> Result<String, DriverError> {
            if target.host == "down" {
                return Err(DriverError::new("connection refused"));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(target.database.clone())
        }

        async fn explain(
            &self,
            connection: &mut String,
            sql: &str,
        ) -> Result<Vec<ExplainRow>, DriverError> {
            if sql.contains("syntax error") {
                return Err(DriverError::new("You have an error in your SQL syntax"));
            }
            Ok(vec![ExplainRow::new("SIMPLE", connection.as_str())])
        }
    }

    fn statement(sql: &str, host: &str) -> ResolvedStatement {
        ResolvedStatement {
            sql: sql.to_string(),
            provenance: Provenance::Argument,
            target: ConnectionDescriptor::new(host, "app", "root", ""),
        }
    }

    #[tokio::test]
    async fn test_connection_is_reused() {
        let driver = Arc::new(CountingDriver::default());
        let mut engine = ExplainEngine::new(driver.clone());

        let result = engine.explain(&statement("SELECT 1", "db1")).await.unwrap();
        engine.explain(&statement("SELECT 2", "db1")).await.unwrap();

        assert_eq!(result.sql, "SELECT 1");
        assert_eq!(result.database, "app");
        assert_eq!(result.count, 1);
        assert_eq!(driver.connects.load(Ordering::SeqCst), 1);
        assert_eq!(engine.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_one_connection_per_target() {
        let driver = Arc::new(CountingDriver::default());
        let mut engine = ExplainEngine::new(driver.clone());

        engine.explain(&statement("SELECT 1", "db1")).await.unwrap();
        engine.explain(&statement("SELECT 1", "db2")).await.unwrap();

        assert_eq!(engine.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_execution_failure_carries_sql_and_drops_connection() {
        let driver = Arc::new(CountingDriver::default());
        let mut engine = ExplainEngine::new(driver.clone());

        let err = engine
            .explain(&statement("SELECT syntax error", "db1"))
            .await
            .unwrap_err();

        match err {
            ExplainError::ExecutionFailed { sql, .. } => assert_eq!(sql, "SELECT syntax error"),
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
        assert_eq!(engine.connection_count(), 0);

        engine.explain(&statement("SELECT 1", "db1")).await.unwrap();
        assert_eq!(driver.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let mut engine = ExplainEngine::new(Arc::new(CountingDriver::default()));
        let err = engine
            .explain(&statement("SELECT 1", "down"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExplainError::Connect { .. }));
    }
}
