//! Log-file query source.

use super::{Emitter, SourceError};
use crate::format::{server_log, FormatKind};
use crate::models::{Provenance, RawStatement};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// How the lines of a log file are grouped into statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryMode {
    /// Every non-empty line is one statement.
    #[default]
    Lines,
    /// Server log entries; lines without an entry header continue the
    /// previous entry.
    ServerLogEntries,
}

impl EntryMode {
    /// Returns the grouping matching a statement format.
    #[must_use]
    pub fn for_format(format: FormatKind) -> Self {
        match format {
            FormatKind::ServerLog => Self::ServerLogEntries,
            FormatKind::Plain | FormatKind::Command => Self::Lines,
        }
    }
}

/// Reads `path` and emits its statements in file order.
///
/// An open or read failure is reported once and ends the source; a partially
/// collected entry is discarded in that case.
pub(super) async fn read(path: &Path, entries: EntryMode, emitter: &Emitter) {
    if emitter.is_cancelled() {
        return;
    }

    let file = match File::open(path).await {
        Ok(file) => file,
        Err(source) => {
            emitter
                .report(SourceError::Io {
                    path: path.to_path_buf(),
                    source,
                })
                .await;
            return;
        }
    };
    tracing::info!(path = %path.display(), ?entries, "Reading statements from log file");

    let mut lines = BufReader::new(file).lines();
    let mut line_no = 0usize;
    let mut pending: Option<(usize, String)> = None;

    loop {
        let next = tokio::select! {
            biased;
            () = emitter.cancel_token().cancelled() => return,
            next = lines.next_line() => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(source) => {
                emitter
                    .report(SourceError::Io {
                        path: path.to_path_buf(),
                        source,
                    })
                    .await;
                return;
            }
        };
        line_no += 1;

        match entries {
            EntryMode::Lines => {
                if line.trim().is_empty() {
                    continue;
                }
                if !emitter
                    .emit(RawStatement::new(line, Provenance::Line(line_no)))
                    .await
                {
                    return;
                }
            }
            EntryMode::ServerLogEntries => {
                if server_log::is_entry_start(&line) {
                    if let Some((start, text)) = pending.replace((line_no, line)) {
                        if !emitter
                            .emit(RawStatement::new(text, Provenance::Line(start)))
                            .await
                        {
                            return;
                        }
                    }
                } else if let Some((_, text)) = pending.as_mut() {
                    text.push('\n');
                    text.push_str(&line);
                } else if !line.trim().is_empty() {
                    pending = Some((line_no, line));
                }
            }
        }
    }

    if let Some((start, text)) = pending {
        emitter
            .emit(RawStatement::new(text, Provenance::Line(start)))
            .await;
    }
}
