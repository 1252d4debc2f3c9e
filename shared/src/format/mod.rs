//! Statement formatting.
//!
//! Turns one raw statement (a log line, a joined log entry or a literal SQL
//! string) into bare SQL text. Three strategies are supported:
//!
//! - [`FormatKind::Plain`]: the input already is SQL
//! - [`FormatKind::ServerLog`]: one entry of the MySQL general query log
//! - [`FormatKind::Command`]: the input is piped through a shell command
//!
//! # Example
//!
//! ```
//! use shared::format::{FormatKind, StatementFormatter};
//!
//! # tokio_test::block_on(async {
//! let formatter = StatementFormatter::new(FormatKind::ServerLog, None);
//! let sql = formatter
//!     .format("2024-05-01T12:00:00.000000Z\t   12 Query\tSELECT * FROM user")
//!     .await
//!     .unwrap();
//! assert_eq!(sql, "SELECT * FROM user");
//! # });
//! ```

pub mod server_log;

use crate::config::RunOptions;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Errors that can occur while formatting a single statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Formatting produced no SQL text.
    #[error("Empty statement")]
    EmptyStatement,

    /// The log entry is a session event (connect, quit, ...) or a log banner.
    #[error("Not a statement: {0}")]
    NotAStatement(String),

    /// No SQL could be isolated from the log entry.
    #[error("Malformed log entry: {0}")]
    MalformedLogEntry(String),

    /// The external format command could not be run or exited with failure.
    #[error("Format command failed: {0}")]
    CommandFailed(String),
}

impl FormatError {
    /// Returns true when the entry should be dropped silently rather than
    /// reported as a failure.
    #[must_use]
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::NotAStatement(_))
    }
}

/// Selectable statement format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatKind {
    /// Bare SQL, one statement per line.
    #[default]
    #[serde(alias = "simple")]
    Plain,
    /// MySQL general query log.
    #[serde(alias = "official")]
    ServerLog,
    /// Transformed by an external shell command.
    Command,
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::ServerLog => write!(f, "server-log"),
            Self::Command => write!(f, "command"),
        }
    }
}

impl FromStr for FormatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "plain" | "simple" => Ok(Self::Plain),
            "server-log" | "official" => Ok(Self::ServerLog),
            "command" => Ok(Self::Command),
            other => Err(format!(
                "Unknown format: '{other}'. Expected 'simple', 'official' or 'command'"
            )),
        }
    }
}

/// Formats raw statements according to one strategy.
#[derive(Debug, Clone, Default)]
pub struct StatementFormatter {
    kind: FormatKind,
    command: Option<String>,
}

impl StatementFormatter {
    /// Creates a formatter. `command` is only used by [`FormatKind::Command`].
    #[must_use]
    pub fn new(kind: FormatKind, command: Option<String>) -> Self {
        Self { kind, command }
    }

    /// Creates the formatter selected by the run options.
    #[must_use]
    pub fn from_options(options: &RunOptions) -> Self {
        Self::new(options.format, options.format_command.clone())
    }

    /// Returns the selected strategy.
    #[must_use]
    pub fn kind(&self) -> FormatKind {
        self.kind
    }

    /// Formats one raw statement into SQL text.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input (or the command output) is empty
    /// - A server log entry carries no SQL or is not a query
    /// - The format command cannot be spawned or exits with failure
    pub async fn format(&self, raw: &str) -> Result<String, FormatError> {
        format_statement(raw, self.kind, self.command.as_deref()).await
    }
}

/// Formats one raw statement into SQL text using the given strategy.
///
/// # Errors
///
/// See [`StatementFormatter::format`].
pub async fn format_statement(
    raw: &str,
    kind: FormatKind,
    command: Option<&str>,
) -> Result<String, FormatError> {
    if raw.is_empty() {
        return Err(FormatError::EmptyStatement);
    }

    match kind {
        FormatKind::Plain => Ok(raw.to_string()),
        FormatKind::ServerLog => server_log::extract_sql(raw),
        FormatKind::Command => {
            let command = command
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| FormatError::CommandFailed("no format command given".into()))?;
            run_command(command, raw).await
        }
    }
}

fn shell(command: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
    #[cfg(not(unix))]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
}

async fn run_command(command: &str, input: &str) -> Result<String, FormatError> {
    let mut child = shell(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| FormatError::CommandFailed(format!("cannot spawn '{command}': {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        let written = async {
            stdin.write_all(input.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.shutdown().await
        }
        .await;

        // Commands that never read stdin close the pipe early.
        if let Err(e) = written {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(FormatError::CommandFailed(format!(
                    "cannot write to '{command}': {e}"
                )));
            }
        }
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| FormatError::CommandFailed(format!("'{command}' failed: {e}")))?;

    if !output.status.success() {
        return Err(FormatError::CommandFailed(format!(
            "'{command}' exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let sql = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sql.is_empty() {
        return Err(FormatError::EmptyStatement);
    }
    Ok(sql)
}
