//! MySQL general query log entries.
//!
//! Handles both layouts the server writes:
//!
//! ```text
//! 2019-02-18T06:53:01.123456Z	   12 Query	SELECT * FROM user
//! 190218  6:53:01	   12 Query	SELECT * FROM user
//! 		   12 Query	SELECT * FROM user
//! ```
//!
//! An entry's SQL may continue over several physical lines; continuation lines
//! carry no header and are joined to the entry by the log-file source.

use super::FormatError;
use nom::{
    branch::alt,
    bytes::complete::{take_till1, take_while1, take_while_m_n},
    character::complete::{char, digit1, space0, space1},
    combinator::{map_res, opt, recognize, rest, success, verify},
    multi::many1,
    sequence::preceded,
    IResult, Parser,
};

/// Command names the server writes in the `Command` column.
const COMMANDS: &[&str] = &[
    "Binlog Dump",
    "Binlog Dump GTID",
    "Change user",
    "Close stmt",
    "Connect",
    "Connect Out",
    "Create DB",
    "Daemon",
    "Debug",
    "Delayed insert",
    "Drop DB",
    "Error",
    "Execute",
    "Fetch",
    "Field List",
    "Init DB",
    "Kill",
    "Long Data",
    "Ping",
    "Prepare",
    "Processlist",
    "Query",
    "Quit",
    "Refresh",
    "Register Slave",
    "Reset stmt",
    "Set option",
    "Shutdown",
    "Sleep",
    "Statistics",
    "Table Dump",
    "Time",
];

/// One parsed general-log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLogEntry<'a> {
    /// Connection (thread) id.
    pub thread_id: u64,
    /// Command name (`Query`, `Connect`, `Quit`, `Init DB`, ...).
    pub command: &'a str,
    /// Command argument; the SQL text for `Query` entries.
    pub argument: &'a str,
}

/// Returns true for the banner lines the server writes when it opens the log.
#[must_use]
pub fn is_banner(line: &str) -> bool {
    line.starts_with("Tcp port:")
        || line.starts_with("Time ")
        || (line.contains(", Version: ") && line.contains("started with:"))
}

/// Returns true if `line` begins a new entry rather than continuing the SQL of
/// the previous one.
///
/// Only a complete `<time>\t<id> <command>` header starts an entry, so SQL
/// continuation lines that begin with a tab or a digit stay with their entry.
#[must_use]
pub fn is_entry_start(line: &str) -> bool {
    is_banner(line) || entry_header(line).is_ok()
}

fn is_iso_time_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, ':' | '.' | 'Z' | '+' | '-')
}

/// `2019-02-18T06:53:01.123456Z` (5.7 and later).
fn iso_timestamp(input: &str) -> IResult<&str, &str> {
    recognize((
        digit1,
        char('-'),
        digit1,
        char('-'),
        digit1,
        char('T'),
        take_while1(is_iso_time_char),
    ))
    .parse(input)
}

/// `190218  6:53:01` (5.6 and earlier).
fn legacy_timestamp(input: &str) -> IResult<&str, &str> {
    recognize((
        take_while_m_n(6, 6, |c: char| c.is_ascii_digit()),
        space1,
        digit1,
        char(':'),
        digit1,
        char(':'),
        digit1,
    ))
    .parse(input)
}

fn command(input: &str) -> IResult<&str, &str> {
    verify(
        take_till1(|c: char| c == '\t' || c == '\n'),
        |name: &str| {
            COMMANDS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(name.trim_end()))
        },
    )
    .parse(input)
}

/// `<time>\t<id> <command>`. The time is empty on lines the 5.6 server logs
/// within the same second as the previous one.
fn entry_header(input: &str) -> IResult<&str, (u64, &str)> {
    let (input, _timestamp) = alt((iso_timestamp, legacy_timestamp, success(""))).parse(input)?;
    let (input, _) = many1(char('\t')).parse(input)?;
    let (input, _) = space0.parse(input)?;
    let (input, thread_id) = map_res(digit1, str::parse::<u64>).parse(input)?;
    let (input, _) = space1.parse(input)?;
    let (input, command) = command.parse(input)?;
    Ok((input, (thread_id, command.trim_end())))
}

/// Parses one entry.
///
/// # Errors
///
/// Returns a nom error if the text has no `<time>\t<id> <command>` header.
pub fn parse_entry(input: &str) -> IResult<&str, ServerLogEntry<'_>> {
    let (input, (thread_id, command)) = entry_header(input)?;
    let (input, argument) = opt(preceded(char('\t'), rest)).parse(input)?;

    Ok((
        input,
        ServerLogEntry {
            thread_id,
            command,
            argument: argument.unwrap_or_default(),
        },
    ))
}

/// Extracts the SQL text of a `Query` entry.
///
/// # Errors
///
/// Returns:
/// - [`FormatError::NotAStatement`] for banners and non-query commands
/// - [`FormatError::MalformedLogEntry`] if no SQL can be isolated
pub fn extract_sql(entry: &str) -> Result<String, FormatError> {
    let entry = entry.trim_end_matches(['\r', '\n']);
    if is_banner(entry) {
        return Err(FormatError::NotAStatement("log banner".into()));
    }

    let (_, parsed) = parse_entry(entry).map_err(|e| {
        FormatError::MalformedLogEntry(format!("no '<id> <command>' header ({e})"))
    })?;

    if !parsed.command.eq_ignore_ascii_case("Query") {
        return Err(FormatError::NotAStatement(parsed.command.to_string()));
    }

    let sql = parsed.argument.trim();
    if sql.is_empty() {
        return Err(FormatError::MalformedLogEntry(format!(
            "query entry of thread {} has no SQL",
            parsed.thread_id
        )));
    }
    Ok(sql.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mysql8_entry() {
        let (_, entry) =
            parse_entry("2019-02-18T06:53:01.123456Z\t   12 Query\tSELECT 1").unwrap();
        assert_eq!(entry.thread_id, 12);
        assert_eq!(entry.command, "Query");
        assert_eq!(entry.argument, "SELECT 1");
    }

    #[test]
    fn test_parse_mysql56_entries() {
        let (_, entry) = parse_entry("190218  6:53:01\t    5 Query\tSELECT 2").unwrap();
        assert_eq!(entry.thread_id, 5);
        assert_eq!(entry.argument, "SELECT 2");

        let (_, entry) = parse_entry("\t\t    5 Query\tSELECT 3").unwrap();
        assert_eq!(entry.argument, "SELECT 3");
    }

    #[test]
    fn test_parse_command_with_space() {
        let (_, entry) = parse_entry("2019-02-18T06:53:01Z\t    7 Init DB\tapp").unwrap();
        assert_eq!(entry.command, "Init DB");
        assert_eq!(entry.argument, "app");
    }

    #[test]
    fn test_parse_entry_without_argument() {
        let (_, entry) = parse_entry("2019-02-18T06:53:01Z\t    7 Quit").unwrap();
        assert_eq!(entry.command, "Quit");
        assert_eq!(entry.argument, "");
    }

    #[test]
    fn test_extract_multiline_sql() {
        let sql = extract_sql("2019-02-18T06:53:01Z\t    7 Query\tSELECT *\nFROM user\nWHERE id = 1\n")
            .unwrap();
        assert_eq!(sql, "SELECT *\nFROM user\nWHERE id = 1");
    }

    #[test]
    fn test_extract_non_query_is_not_a_statement() {
        let err = extract_sql("2019-02-18T06:53:01Z\t    7 Connect\troot@localhost on app").unwrap_err();
        assert_eq!(err, FormatError::NotAStatement("Connect".into()));
    }

    #[test]
    fn test_extract_banner_is_not_a_statement() {
        for line in [
            "/usr/sbin/mysqld, Version: 8.0.36 (MySQL Community Server - GPL). started with:",
            "Tcp port: 3306  Unix socket: /var/run/mysqld/mysqld.sock",
            "Time                 Id Command    Argument",
        ] {
            assert!(extract_sql(line).unwrap_err().is_skippable(), "{line}");
        }
    }

    #[test]
    fn test_extract_malformed() {
        let err = extract_sql("SELECT * FROM user").unwrap_err();
        assert!(matches!(err, FormatError::MalformedLogEntry(_)));

        let err = extract_sql("2019-02-18T06:53:01Z\t    7 Query\t   ").unwrap_err();
        assert!(matches!(err, FormatError::MalformedLogEntry(_)));
    }

    #[test]
    fn test_is_entry_start() {
        assert!(is_entry_start("2019-02-18T06:53:01Z\t    7 Query\tSELECT 1"));
        assert!(is_entry_start("\t\t    5 Query\tSELECT 3"));
        assert!(is_entry_start("Time                 Id Command    Argument"));
        assert!(!is_entry_start("FROM user"));
        assert!(!is_entry_start("  WHERE id = 1"));
    }

    #[test]
    fn test_continuation_lines_are_not_entry_starts() {
        for line in [
            "\tFROM user",
            "\t\tWHERE id = 1",
            "1, 2)",
            "2024, 'x')",
            "\t  3 rows",
            "190218 is not a time",
            "2019-02-18 as a literal",
        ] {
            assert!(!is_entry_start(line), "{line:?}");
        }
    }

    #[test]
    fn test_entry_start_requires_known_command() {
        assert!(is_entry_start("190218  6:53:01\t    5 Init DB\tapp"));
        assert!(is_entry_start("2019-02-18T06:53:01.123456+09:00\t   12 Quit"));
        assert!(!is_entry_start("2019-02-18T06:53:01Z\t   12 Frobnicate\tx"));
    }

    #[test]
    fn test_extract_sql_with_indented_continuation() {
        let sql = extract_sql("2019-02-18T06:53:01Z\t 12 Query\tSELECT *\n\tFROM user\nWHERE id IN (\n1, 2)")
            .unwrap();
        assert_eq!(sql, "SELECT *\n\tFROM user\nWHERE id IN (\n1, 2)");
    }
}
