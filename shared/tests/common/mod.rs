//! Common test utilities and helpers for pipeline tests.
//!
//! This module provides the scripted collaborators shared by the pipeline
//! tests: an EXPLAIN driver, mapping stores, a query log and log files on disk.

use async_trait::async_trait;
use shared::config::RunOptions;
use shared::explain::{DriverError, ExplainDriver};
use shared::filter::FilterSpec;
use shared::models::{ConnectionDescriptor, ExplainRow};
use shared::pipeline::{CollectingSink, Pipeline, RunReport};
use shared::resolve::{first_table, MappingError, MappingStore, TableMapping};
use shared::source::{EntryMode, LogRecord, QuerySource, SourceError, StatementLog};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

/// Driver that plans every statement as a scan of its first table.
///
/// Statements containing `FAIL` are rejected.
#[derive(Default)]
pub struct FakeDriver {
    plans: HashMap<String, Vec<ExplainRow>>,
    explain_calls: AtomicUsize,
}

impl FakeDriver {
    pub fn with_plan(mut self, sql: &str, rows: Vec<ExplainRow>) -> Self {
        self.plans.insert(sql.to_string(), rows);
        self
    }

    /// Number of EXPLAIN calls seen so far.
    pub fn calls(&self) -> usize {
        self.explain_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExplainDriver for FakeDriver {
    type Connection = ();

    async fn connect(&self, _target: &ConnectionDescriptor) -> Result<(), DriverError> {
        Ok(())
    }

    async fn explain(&self, _connection: &mut (), sql: &str) -> Result<Vec<ExplainRow>, DriverError> {
        self.explain_calls.fetch_add(1, Ordering::SeqCst);
        if sql.contains("FAIL") {
            return Err(DriverError::new("You have an error in your SQL syntax"));
        }
        if let Some(rows) = self.plans.get(sql) {
            return Ok(rows.clone());
        }
        let table = first_table(sql).map(|t| t.table).unwrap_or_default();
        Ok(vec![ExplainRow::new("SIMPLE", table).with_access_type("ALL")])
    }
}

/// Mapping store whose refresh always fails.
pub struct FailingRefreshStore;

#[async_trait]
impl MappingStore for FailingRefreshStore {
    async fn load(&self) -> Result<TableMapping, MappingError> {
        Ok(TableMapping::new())
    }

    async fn reload(&self) -> Result<(), MappingError> {
        Err(MappingError::Catalog {
            target: "root@db1:3306/app".into(),
            message: "connection refused".into(),
        })
    }
}

/// Server-wide query log with one scripted response per host.
///
/// Host `down` refuses the connection. Every other host returns a query on
/// `user`, an undecodable row and a query on `invoice`.
#[derive(Default)]
pub struct ScriptedLog {
    /// Hosts in the order they were read.
    pub fetched: Mutex<Vec<String>>,
}

impl ScriptedLog {
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatementLog for ScriptedLog {
    async fn fetch(
        &self,
        target: &ConnectionDescriptor,
    ) -> Result<Vec<Result<LogRecord, SourceError>>, SourceError> {
        self.fetched.lock().unwrap().push(target.host.clone());
        match target.host.as_str() {
            "down" => Err(SourceError::Connect {
                target: target.to_string(),
                message: "connection refused".into(),
            }),
            _ => Ok(vec![
                Ok(LogRecord::new("SELECT * FROM user")),
                Err(SourceError::Decode {
                    target: target.to_string(),
                    index: 1,
                    message: "argument is not valid UTF-8".into(),
                }),
                Ok(LogRecord::new("SELECT * FROM invoice")),
            ]),
        }
    }
}

pub fn app() -> ConnectionDescriptor {
    ConnectionDescriptor::new("db1", "app", "root", "")
}

pub fn fixed_options() -> RunOptions {
    RunOptions::new().with_fixed_target(app())
}

/// Writes `lines` to a temporary file, one per line.
pub fn log_file(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file.flush().unwrap();
    file
}

pub fn lines_source(file: &NamedTempFile) -> QuerySource {
    QuerySource::LogFile {
        path: file.path().to_path_buf(),
        entries: EntryMode::Lines,
    }
}

pub fn server_log_source(file: &NamedTempFile) -> QuerySource {
    QuerySource::LogFile {
        path: file.path().to_path_buf(),
        entries: EntryMode::ServerLogEntries,
    }
}

/// Runs a pipeline to completion with a fresh token and a collecting sink.
pub async fn run_with(
    options: RunOptions,
    filter: FilterSpec,
    driver: Arc<FakeDriver>,
    source: QuerySource,
    store: &dyn MappingStore,
) -> (RunReport, CollectingSink) {
    let pipeline = Pipeline::new(options, filter, driver);
    let mut sink = CollectingSink::new();
    let report = pipeline
        .run(source, store, &mut sink, CancellationToken::new())
        .await;
    (report, sink)
}
