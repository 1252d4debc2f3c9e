//! Pipeline orchestration.
//!
//! A run wires a [`QuerySource`] to the explain stage and drains the stage's
//! results through the [`FilterSpec`], the [`DedupAggregator`] and finally a
//! [`ResultSink`]:
//!
//! ```text
//! source ──statements──▶ explain stage ──results──▶ filter ▶ dedupe ▶ sink
//!    └──source errors──▶ orchestrator ◀──statement errors──┘
//! ```
//!
//! The orchestrator owns the merge loop. Each path is a bounded channel whose
//! closure marks end-of-stream; a closed path is never polled again. The run
//! ends `Completed` when every path has closed, `Aborted` on the first fatal
//! error and `Cancelled` when the caller's token fires.

mod sink;
mod stage;

pub use sink::{CollectingSink, ResultSink};

use crate::config::{ConfigError, RunOptions};
use crate::dedupe::{Aggregate, DedupAggregator};
use crate::explain::{ExplainDriver, ExplainEngine, ExplainError};
use crate::filter::FilterSpec;
use crate::format::{FormatError, StatementFormatter};
use crate::models::Provenance;
use crate::resolve::{self, MappingStore, ResolutionError};
use crate::source::{QuerySource, SourceChannels, SourceError};
use stage::ExplainStage;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Why one statement could not be explained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatementErrorKind {
    /// The raw text could not be turned into SQL.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// No database could be chosen for the statement.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The database rejected the EXPLAIN or could not be reached.
    #[error(transparent)]
    Explain(#[from] ExplainError),
}

/// A per-statement failure, tagged with the statement it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{provenance}: {kind}")]
pub struct StatementError {
    /// The raw statement text.
    pub text: String,
    /// Where the statement came from.
    pub provenance: Provenance,
    /// What went wrong.
    #[source]
    pub kind: StatementErrorKind,
}

/// The error that ended a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run could not be set up.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The query source failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A statement failed while errors were not ignored.
    #[error(transparent)]
    Statement(#[from] StatementError),

    /// A pipeline task stopped unexpectedly.
    #[error("Pipeline stage failed: {0}")]
    Stage(String),
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Not started.
    #[default]
    Idle,
    /// Stages are running.
    Running,
    /// Every path reached end-of-stream without a fatal error.
    Completed,
    /// A fatal error ended the run.
    Aborted,
    /// The caller cancelled the run.
    Cancelled,
}

impl RunState {
    /// Returns true for the three final states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Cancelled)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Final state.
    pub state: RunState,
    /// Results handed to the sink.
    pub emitted: usize,
    /// Results dropped by the filter.
    pub filtered_out: usize,
    /// Per-statement failures that were tolerated.
    pub statement_errors: Vec<StatementError>,
    /// Non-fatal source failures.
    pub source_warnings: Vec<SourceError>,
    /// The error that aborted the run.
    pub error: Option<PipelineError>,
}

impl RunReport {
    fn abort(&mut self, error: PipelineError) {
        tracing::error!(error = %error, "Run aborted");
        self.state = RunState::Aborted;
        self.error = Some(error);
    }
}

/// Runs EXPLAIN over a stream of statements.
///
/// # Example
///
/// ```no_run
/// use shared::config::RunOptions;
/// use shared::filter::FilterSpec;
/// use shared::models::ConnectionDescriptor;
/// use shared::mysql::MySqlDriver;
/// use shared::pipeline::{CollectingSink, Pipeline};
/// use shared::resolve::InMemoryMappingStore;
/// use shared::source::QuerySource;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let options = RunOptions::new()
///     .with_fixed_target(ConnectionDescriptor::new("127.0.0.1", "app", "root", ""));
/// let pipeline = Pipeline::new(options, FilterSpec::new(), Arc::new(MySqlDriver::new()));
///
/// let mut sink = CollectingSink::new();
/// let report = pipeline
///     .run(
///         QuerySource::Single("SELECT * FROM user".into()),
///         &InMemoryMappingStore::default(),
///         &mut sink,
///         CancellationToken::new(),
///     )
///     .await;
/// println!("{}: {} results", report.state, report.emitted);
/// # }
/// ```
pub struct Pipeline<D: ExplainDriver> {
    options: RunOptions,
    filter: FilterSpec,
    driver: Arc<D>,
}

impl<D: ExplainDriver> std::fmt::Debug for Pipeline<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("options", &self.options)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl<D: ExplainDriver + 'static> Pipeline<D> {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(options: RunOptions, filter: FilterSpec, driver: Arc<D>) -> Self {
        Self {
            options,
            filter,
            driver,
        }
    }

    /// Options the pipeline runs with.
    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Executes one run and reports how it ended.
    ///
    /// The resolver is initialized first; a configuration failure aborts the
    /// run before any statement is read. A [`QuerySource::DatabaseLog`]
    /// without targets reads the query log of every server the resolver knows,
    /// once per server.
    ///
    /// Cancelling `cancel` stops both stages; results already handed to the
    /// sink stay there. With dedupe active, the aggregated records are
    /// rendered once the run has ended, whatever the final state.
    pub async fn run(
        &self,
        source: QuerySource,
        store: &dyn MappingStore,
        sink: &mut dyn ResultSink,
        cancel: CancellationToken,
    ) -> RunReport {
        let mut report = RunReport {
            state: RunState::Running,
            ..RunReport::default()
        };
        tracing::info!(
            source = ?source,
            mapping = self.options.use_mapping,
            ignore_errors = self.options.ignore_errors,
            dedupe = self.options.dedupe,
            "Starting run"
        );

        if let Err(e) = self.options.validate() {
            report.abort(e.into());
            return report;
        }
        let resolver = match resolve::initialize(&self.options, store).await {
            Ok(resolver) => resolver,
            Err(e) => {
                report.abort(e.into());
                return report;
            }
        };

        let source = match source {
            QuerySource::DatabaseLog { log, targets } if targets.is_empty() => {
                QuerySource::DatabaseLog {
                    log,
                    targets: resolver.log_targets(),
                }
            }
            other => other,
        };

        let token = cancel.child_token();
        let (
            SourceChannels {
                statements,
                errors: mut source_errors,
            },
            source_handle,
        ) = source.spawn(token.clone());
        let stage = ExplainStage {
            formatter: StatementFormatter::from_options(&self.options),
            resolver,
            engine: ExplainEngine::new(Arc::clone(&self.driver)),
            ignore_errors: self.options.ignore_errors,
        };
        let (mut stage_channels, stage_handle) =
            stage.spawn(statements, token.clone());

        let mut aggregator = DedupAggregator::new(self.options.dedupe);
        let mut results_open = true;
        let mut source_errors_open = true;
        let mut stage_errors_open = true;

        while report.state == RunState::Running {
            if !(results_open || source_errors_open || stage_errors_open) {
                report.state = RunState::Completed;
                break;
            }

            tokio::select! {
                biased;
                () = token.cancelled() => {
                    tracing::info!("Run cancelled");
                    report.state = RunState::Cancelled;
                }
                received = stage_channels.results.recv(), if results_open => match received {
                    Some(result) if self.filter.passes(&result) => {
                        if let Aggregate::PassThrough(result) = aggregator.add(result) {
                            sink.render(&result, false);
                            report.emitted += 1;
                        }
                    }
                    Some(result) => {
                        tracing::debug!(sql = %result.sql, "Result filtered out");
                        report.filtered_out += 1;
                    }
                    None => results_open = false,
                },
                received = source_errors.recv(), if source_errors_open => match received {
                    Some(error) if error.is_fatal() => report.abort(error.into()),
                    Some(error) => report.source_warnings.push(error),
                    None => source_errors_open = false,
                },
                received = stage_channels.errors.recv(), if stage_errors_open => match received {
                    Some(error) if self.options.ignore_errors => {
                        tracing::warn!(error = %error, "Statement failed");
                        report.statement_errors.push(error);
                    }
                    Some(error) => report.abort(error.into()),
                    None => stage_errors_open = false,
                },
            }
        }

        token.cancel();
        for (name, handle) in [("source", source_handle), ("explain", stage_handle)] {
            if let Err(message) = join_stage(handle).await {
                if report.state != RunState::Aborted {
                    report.abort(PipelineError::Stage(format!("{name} task {message}")));
                }
            }
        }

        if aggregator.is_active() {
            for record in aggregator.drain() {
                sink.render(&record, true);
                report.emitted += 1;
            }
        }

        tracing::info!(
            state = %report.state,
            emitted = report.emitted,
            filtered_out = report.filtered_out,
            statement_errors = report.statement_errors.len(),
            "Run finished"
        );
        report
    }
}

async fn join_stage(handle: JoinHandle<()>) -> Result<(), String> {
    match handle.await {
        Ok(()) => Ok(()),
        Err(e) if e.is_panic() => Err("panicked".to_string()),
        Err(e) => Err(e.to_string()),
    }
}
