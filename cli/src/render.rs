//! Terminal output.

use crate::options::{OutputFormat, Settings};
use shared::filter::Attribute;
use shared::models::{ExplainResult, ExplainRow};
use shared::pipeline::ResultSink;
use std::io::Write;

const HEADERS: [&str; 12] = [
    "id",
    "select_type",
    "table",
    "partitions",
    "type",
    "possible_keys",
    "key",
    "key_len",
    "ref",
    "rows",
    "filtered",
    "Extra",
];

/// Sink writing results to a terminal (or any writer).
#[derive(Debug)]
pub struct TerminalSink<W: Write + Send> {
    output: OutputFormat,
    out: W,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(output: OutputFormat, out: W) -> Self {
        Self { output, out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_table(&mut self, result: &ExplainResult, dedupe_active: bool) -> std::io::Result<()> {
        writeln!(self.out, "SQL: {}", result.sql)?;
        writeln!(self.out, "Database: {}", result.database)?;
        if dedupe_active {
            writeln!(self.out, "Count: {}", result.count)?;
        }

        let cells: Vec<[String; 12]> = result.rows.iter().map(row_cells).collect();
        let mut widths = HEADERS.map(str::len);
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let border = widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+");
        writeln!(self.out, "+{border}+")?;
        write_line(&mut self.out, &HEADERS, &widths)?;
        writeln!(self.out, "+{border}+")?;
        for row in &cells {
            write_line(&mut self.out, row, &widths)?;
        }
        writeln!(self.out, "+{border}+")?;
        writeln!(self.out)
    }

    fn write_json(&mut self, result: &ExplainResult) -> std::io::Result<()> {
        let line = serde_json::to_string(result)?;
        writeln!(self.out, "{line}")
    }
}

impl<W: Write + Send> ResultSink for TerminalSink<W> {
    fn render(&mut self, result: &ExplainResult, dedupe_active: bool) {
        let written = match self.output {
            OutputFormat::Table => self.write_table(result, dedupe_active),
            OutputFormat::Json => self.write_json(result),
        };
        if let Err(e) = written.and_then(|()| self.out.flush()) {
            tracing::warn!(error = %e, "Failed to write result");
        }
    }
}

fn row_cells(row: &ExplainRow) -> [String; 12] {
    let text = |value: &Option<String>| value.clone().unwrap_or_else(|| "NULL".to_string());
    let number = |value: Option<u64>| value.map_or_else(|| "NULL".to_string(), |n| n.to_string());

    [
        number(row.id),
        row.select_type.clone(),
        text(&row.table),
        text(&row.partitions),
        text(&row.access_type),
        text(&row.possible_keys),
        text(&row.key),
        text(&row.key_len),
        text(&row.reference),
        number(row.rows),
        row.filtered
            .map_or_else(|| "NULL".to_string(), |f| format!("{f:.2}")),
        text(&row.extra),
    ]
}

fn write_line<W: Write, S: AsRef<str>>(out: &mut W, cells: &[S], widths: &[usize]) -> std::io::Result<()> {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!(" {:<width$} ", cell.as_ref()))
        .collect::<Vec<_>>()
        .join("|");
    writeln!(out, "|{line}|")
}

/// Prints the effective options of a run.
pub fn print_options<W: Write>(out: &mut W, settings: &Settings) -> std::io::Result<()> {
    let run = &settings.run;
    writeln!(out, "mode: {:?}", settings.mode)?;
    writeln!(out, "target: {}", run.fixed)?;
    writeln!(out, "use table map: {}", run.use_mapping)?;
    writeln!(out, "table map: {}", run.mapping_path.display())?;
    writeln!(out, "update table map: {}", run.refresh_mapping)?;
    if let Some(path) = &settings.log_path {
        writeln!(out, "log: {}", path.display())?;
    }
    writeln!(out, "format: {}", run.format)?;
    if let Some(command) = &run.format_command {
        writeln!(out, "format command: {command}")?;
    }
    writeln!(out, "ignore error: {}", run.ignore_errors)?;
    writeln!(out, "combine sql: {}", run.dedupe)?;
    for attribute in Attribute::ALL {
        let filter = settings.filter.attribute(attribute);
        if !filter.included().is_empty() {
            writeln!(out, "filter {attribute}: {}", join(filter.included()))?;
        }
        if !filter.excluded().is_empty() {
            writeln!(out, "filter no {attribute}: {}", join(filter.excluded()))?;
        }
    }
    writeln!(out)
}

fn join<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
    values.into_iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> ExplainResult {
        ExplainResult::new(
            "SELECT * FROM user",
            "app",
            vec![ExplainRow::new("SIMPLE", "user")
                .with_access_type("ALL")
                .with_rows(120)],
        )
    }

    #[test]
    fn test_table_output() {
        let mut sink = TerminalSink::new(OutputFormat::Table, Vec::new());
        sink.render(&result(), false);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.starts_with("SQL: SELECT * FROM user\nDatabase: app\n"));
        assert!(!text.contains("Count:"));
        assert!(text.contains("| select_type |"));
        assert!(text.contains("| SIMPLE      |"));
        assert!(text.contains("| ALL  |"));
        assert!(text.contains("| 120  |"));
    }

    #[test]
    fn test_table_output_with_count() {
        let mut record = result();
        record.count = 3;

        let mut sink = TerminalSink::new(OutputFormat::Table, Vec::new());
        sink.render(&record, true);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.contains("Count: 3\n"));
    }

    #[test]
    fn test_json_output() {
        let mut sink = TerminalSink::new(OutputFormat::Json, Vec::new());
        sink.render(&result(), false);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["sql"], "SELECT * FROM user");
        assert_eq!(value["count"], 1);
        assert_eq!(value["rows"][0]["type"], "ALL");
    }
}
