//! The explain stage: format, resolve and explain each raw statement.

use super::{StatementError, StatementErrorKind};
use crate::explain::{ExplainDriver, ExplainEngine};
use crate::format::StatementFormatter;
use crate::models::{ExplainResult, RawStatement, ResolvedStatement};
use crate::resolve::DatabaseResolver;
use crate::source::CHANNEL_CAPACITY;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Receiving ends of a running explain stage.
#[derive(Debug)]
pub(crate) struct StageChannels {
    pub results: mpsc::Receiver<ExplainResult>,
    pub errors: mpsc::Receiver<StatementError>,
}

pub(crate) struct ExplainStage<D: ExplainDriver> {
    pub formatter: StatementFormatter,
    pub resolver: DatabaseResolver,
    pub engine: ExplainEngine<D>,
    pub ignore_errors: bool,
}

impl<D: ExplainDriver + 'static> ExplainStage<D> {
    /// Starts the stage on a new task, consuming `statements` until the
    /// channel closes, `cancel` fires, or a statement fails while errors are
    /// not ignored.
    pub(crate) fn spawn(
        self,
        statements: mpsc::Receiver<RawStatement>,
        cancel: CancellationToken,
    ) -> (StageChannels, JoinHandle<()>) {
        let (result_tx, results) = mpsc::channel(CHANNEL_CAPACITY);
        let (error_tx, errors) = mpsc::channel(CHANNEL_CAPACITY);

        let handle = tokio::spawn(self.run(statements, result_tx, error_tx, cancel));

        (StageChannels { results, errors }, handle)
    }

    async fn run(
        mut self,
        mut statements: mpsc::Receiver<RawStatement>,
        results: mpsc::Sender<ExplainResult>,
        errors: mpsc::Sender<StatementError>,
        cancel: CancellationToken,
    ) {
        let mut processed = 0usize;

        loop {
            let raw = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = statements.recv() => match next {
                    Some(raw) => raw,
                    None => break,
                },
            };

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                outcome = self.process(&raw) => outcome,
            };
            processed += 1;

            let delivered = match outcome {
                Ok(Some(result)) => send(&results, result, &cancel).await,
                Ok(None) => true,
                Err(kind) => {
                    let error = StatementError {
                        text: raw.text,
                        provenance: raw.provenance,
                        kind,
                    };
                    send(&errors, error, &cancel).await && self.ignore_errors
                }
            };
            if !delivered {
                break;
            }
        }

        tracing::debug!(processed, "Explain stage finished");
    }

    async fn process(
        &mut self,
        raw: &RawStatement,
    ) -> Result<Option<ExplainResult>, StatementErrorKind> {
        let sql = match self.formatter.format(&raw.text).await {
            Ok(sql) => sql,
            Err(e) if e.is_skippable() => {
                tracing::debug!(provenance = %raw.provenance, reason = %e, "Skipping entry");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let target = self.resolver.resolve(&sql)?.clone();
        tracing::debug!(provenance = %raw.provenance, target_db = %target, "Explaining statement");

        let statement = ResolvedStatement {
            sql,
            provenance: raw.provenance.clone(),
            target,
        };
        Ok(Some(self.engine.explain(&statement).await?))
    }
}

async fn send<T>(tx: &mpsc::Sender<T>, value: T, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = tx.send(value) => sent.is_ok(),
    }
}
