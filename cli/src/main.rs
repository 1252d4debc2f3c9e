//! expl CLI
//!
//! Runs MySQL EXPLAIN over one statement, a log file or the general query
//! log of the mapped databases, and prints the plans.
//!
//! # Usage
//!
//! ```bash
//! expl --help
//! expl explain simple "SELECT * FROM user WHERE id = 1" -d app -H 127.0.0.1 -u root
//! expl explain log -l general.log -f official -C --filter-type ALL
//! expl explain log-db -P -I -o json
//! ```

#![deny(unsafe_code)]

mod options;
mod render;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use options::{ExplainArgs, Mode, OptionFile, Settings};
use render::TerminalSink;
use shared::mysql::MySqlDriver;
use shared::pipeline::{Pipeline, RunState};
use shared::resolve::FileMappingStore;
use shared::source::{EntryMode, QuerySource};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// expl - explain SQL statements against MySQL
#[derive(Parser)]
#[command(name = "expl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run EXPLAIN on statements from the command line, a log file or the database log
    Explain(ExplainArgs),
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn query_source(settings: &Settings) -> Result<QuerySource> {
    let source = match settings.mode {
        Mode::Simple => QuerySource::Single(settings.sql.clone().context("SQL statement missing")?),
        Mode::Log => QuerySource::LogFile {
            path: settings.log_path.clone().context("Log file missing")?,
            entries: EntryMode::for_format(settings.run.format),
        },
        Mode::LogDb => QuerySource::DatabaseLog {
            log: Arc::new(MySqlDriver::new()),
            targets: Vec::new(),
        },
    };
    Ok(source)
}

async fn explain(args: ExplainArgs) -> Result<()> {
    let file = match &args.option_file {
        Some(path) => OptionFile::load(path)?,
        None => OptionFile::default(),
    };
    let settings = Settings::merge(args, file)?;
    init_tracing(settings.verbose);

    if settings.verbose {
        render::print_options(&mut std::io::stdout().lock(), &settings)?;
    }

    let source = query_source(&settings)?;
    let store = FileMappingStore::new(settings.run.mapping_path.clone(), MySqlDriver::new());
    let pipeline = Pipeline::new(
        settings.run.clone(),
        settings.filter.clone(),
        Arc::new(MySqlDriver::new()),
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            ctrl_c.cancel();
        }
    });

    let mut sink = TerminalSink::new(settings.output, std::io::stdout());
    let report = pipeline.run(source, &store, &mut sink, cancel).await;

    for error in &report.statement_errors {
        eprintln!("Skipped {error}");
    }

    match report.state {
        RunState::Aborted => match report.error {
            Some(error) => Err(error.into()),
            None => bail!("Run aborted"),
        },
        RunState::Cancelled => bail!("Interrupted"),
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Explain(args) => explain(args).await,
    }
}
