//! MySQL backend built on `mysql_async`.
//!
//! [`MySqlDriver`] provides the three database capabilities the pipeline
//! needs: running EXPLAIN, reading `mysql.general_log` and listing tables for
//! a mapping refresh.

use crate::explain::{DriverError, ExplainDriver};
use crate::models::{ConnectionDescriptor, ExplainRow};
use crate::resolve::{MappingError, TableCatalog};
use crate::source::{LogRecord, SourceError, StatementLog};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Row, Value};

const GENERAL_LOG_QUERY: &str = "SELECT CAST(event_time AS CHAR), argument \
     FROM mysql.general_log WHERE command_type = 'Query'";

const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Database driver for MySQL servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDriver;

impl MySqlDriver {
    /// Creates the driver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn open(target: &ConnectionDescriptor) -> Result<Conn, mysql_async::Error> {
        let mut builder = OptsBuilder::from_opts(Opts::default())
            .ip_or_hostname(target.host.as_str())
            .tcp_port(target.port)
            .db_name(Some(target.database.as_str()))
            .user(Some(target.user.as_str()));
        if !target.password.is_empty() {
            builder = builder.pass(Some(target.password.as_str()));
        }

        tracing::debug!(target_db = %target, "Connecting to MySQL");
        Conn::new(builder).await
    }
}

#[async_trait]
impl ExplainDriver for MySqlDriver {
    type Connection = Conn;

    async fn connect(&self, target: &ConnectionDescriptor) -> Result<Conn, DriverError> {
        Self::open(target)
            .await
            .map_err(|e| DriverError::new(e.to_string()))
    }

    async fn explain(&self, connection: &mut Conn, sql: &str) -> Result<Vec<ExplainRow>, DriverError> {
        let rows: Vec<Row> = connection
            .query(format!("EXPLAIN {sql}"))
            .await
            .map_err(|e| DriverError::new(e.to_string()))?;

        Ok(rows.iter().map(explain_row).collect())
    }
}

#[async_trait]
impl StatementLog for MySqlDriver {
    async fn fetch(
        &self,
        target: &ConnectionDescriptor,
    ) -> Result<Vec<Result<LogRecord, SourceError>>, SourceError> {
        let mut conn = Self::open(target).await.map_err(|e| SourceError::Connect {
            target: target.to_string(),
            message: e.to_string(),
        })?;

        let rows: Vec<Row> = conn
            .query(GENERAL_LOG_QUERY)
            .await
            .map_err(|e| SourceError::Query {
                target: target.to_string(),
                message: e.to_string(),
            })?;

        if let Err(e) = conn.disconnect().await {
            tracing::debug!(error = %e, "Disconnect after log fetch failed");
        }

        Ok(rows
            .iter()
            .enumerate()
            .map(|(index, row)| log_record(row).map_err(|message| SourceError::Decode {
                target: target.to_string(),
                index,
                message,
            }))
            .collect())
    }
}

#[async_trait]
impl TableCatalog for MySqlDriver {
    async fn list_tables(&self, target: &ConnectionDescriptor) -> Result<Vec<String>, MappingError> {
        let catalog_error = |e: mysql_async::Error| MappingError::Catalog {
            target: target.to_string(),
            message: e.to_string(),
        };

        let mut conn = Self::open(target).await.map_err(catalog_error)?;
        let tables: Vec<String> = conn.query("SHOW TABLES").await.map_err(catalog_error)?;

        if let Err(e) = conn.disconnect().await {
            tracing::debug!(error = %e, "Disconnect after SHOW TABLES failed");
        }
        Ok(tables)
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::Int(n) => Some(n.to_string()),
        Value::UInt(n) => Some(n.to_string()),
        Value::Float(n) => Some(n.to_string()),
        Value::Double(n) => Some(n.to_string()),
        other => Some(other.as_sql(true)),
    }
}

/// Maps one EXPLAIN result row by column name.
fn explain_row(row: &Row) -> ExplainRow {
    let mut explain = ExplainRow::default();

    for (index, column) in row.columns_ref().iter().enumerate() {
        let text = row.as_ref(index).and_then(value_text);
        match column.name_str().to_ascii_lowercase().as_str() {
            "id" => explain.id = text.and_then(|t| t.parse().ok()),
            "select_type" => explain.select_type = text.unwrap_or_default(),
            "table" => explain.table = text,
            "partitions" => explain.partitions = text,
            "type" => explain.access_type = text,
            "possible_keys" => explain.possible_keys = text,
            "key" => explain.key = text,
            "key_len" => explain.key_len = text,
            "ref" => explain.reference = text,
            "rows" => explain.rows = text.and_then(|t| t.parse().ok()),
            "filtered" => explain.filtered = text.and_then(|t| t.parse().ok()),
            "extra" => explain.extra = text,
            _ => {}
        }
    }

    explain
}

/// Decodes one `general_log` row into a record.
fn log_record(row: &Row) -> Result<LogRecord, String> {
    let sql = match row.as_ref(1) {
        Some(Value::Bytes(bytes)) => String::from_utf8(bytes.clone())
            .map_err(|e| format!("argument is not valid UTF-8: {e}"))?,
        Some(Value::NULL) | None => return Err("argument is missing".to_string()),
        Some(other) => return Err(format!("unexpected argument value {other:?}")),
    };

    let event_time = row
        .as_ref(0)
        .and_then(value_text)
        .and_then(|t| parse_event_time(&t));

    Ok(LogRecord::new(sql).with_event_time(event_time))
}

fn parse_event_time(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), EVENT_TIME_FORMAT).ok()
}
