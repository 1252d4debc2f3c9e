//! Command-line options and their merge with the option file.
//!
//! Values are taken from the command line (or its environment variables)
//! first, then from the TOML option file given by `--option-file` /
//! `EXPL_OPTION`, then from built-in defaults.

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use serde::Deserialize;
use shared::config::{RunOptions, DEFAULT_MAPPING_FILE};
use shared::filter::{Attribute, FilterSpec};
use shared::format::FormatKind;
use shared::models::{ConnectionDescriptor, DEFAULT_MYSQL_PORT};
use std::path::{Path, PathBuf};

/// Where statements are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// One statement given on the command line
    Simple,
    /// A log file
    Log,
    /// The general query log of the mapped databases
    LogDb,
}

/// How results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned text tables
    #[default]
    Table,
    /// One JSON object per line
    Json,
}

/// Arguments of the `explain` subcommand.
#[derive(Debug, Args)]
pub struct ExplainArgs {
    /// Where statements are read from
    #[arg(value_enum)]
    pub mode: Mode,

    /// SQL statement (simple mode)
    pub sql: Option<String>,

    /// Database name
    #[arg(short, long)]
    pub database: Option<String>,

    /// Database host
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Database port
    #[arg(long)]
    pub port: Option<u16>,

    /// Database user
    #[arg(short, long)]
    pub user: Option<String>,

    /// Database password
    #[arg(short, long)]
    pub pass: Option<String>,

    /// Table mapping file
    #[arg(short, long, env = "EXPL_CONF")]
    pub conf: Option<PathBuf>,

    /// Log file (log mode)
    #[arg(short, long, env = "EXPL_LOG")]
    pub log: Option<PathBuf>,

    /// Statement format: simple, official or command
    #[arg(short, long)]
    pub format: Option<FormatKind>,

    /// Shell command that turns each raw statement into SQL
    #[arg(long)]
    pub format_cmd: Option<String>,

    /// Keep results with one of these select_type values
    #[arg(long, value_delimiter = ',')]
    pub filter_select_type: Vec<String>,

    /// Drop results with one of these select_type values
    #[arg(long, value_delimiter = ',')]
    pub filter_no_select_type: Vec<String>,

    /// Keep results touching one of these tables
    #[arg(long, value_delimiter = ',')]
    pub filter_table: Vec<String>,

    /// Drop results touching one of these tables
    #[arg(long, value_delimiter = ',')]
    pub filter_no_table: Vec<String>,

    /// Keep results with one of these access types
    #[arg(long, value_delimiter = ',')]
    pub filter_type: Vec<String>,

    /// Drop results with one of these access types
    #[arg(long, value_delimiter = ',')]
    pub filter_no_type: Vec<String>,

    /// Keep results with one of these possible keys
    #[arg(long, value_delimiter = ',')]
    pub filter_possible_keys: Vec<String>,

    /// Drop results with one of these possible keys
    #[arg(long, value_delimiter = ',')]
    pub filter_no_possible_keys: Vec<String>,

    /// Keep results using one of these keys
    #[arg(long, value_delimiter = ',')]
    pub filter_key: Vec<String>,

    /// Drop results using one of these keys
    #[arg(long, value_delimiter = ',')]
    pub filter_no_key: Vec<String>,

    /// Keep results with one of these Extra values
    #[arg(long, value_delimiter = ',')]
    pub filter_extra: Vec<String>,

    /// Drop results with one of these Extra values
    #[arg(long, value_delimiter = ',')]
    pub filter_no_extra: Vec<String>,

    /// Resolve databases through the table mapping even when host, database
    /// and user are all given (log modes)
    #[arg(short = 'U', long)]
    pub use_table_map: bool,

    /// Rebuild the table mapping from the live databases before running
    #[arg(short = 'P', long)]
    pub update_table_map: bool,

    /// Report failing statements and continue
    #[arg(short = 'I', long)]
    pub ignore_error: bool,

    /// Combine identical statements into one result with a count
    #[arg(short = 'C', long)]
    pub combine_sql: bool,

    /// TOML file supplying any of the options above
    #[arg(long, env = "EXPL_OPTION")]
    pub option_file: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Print the effective options and enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Contents of an option file. Keys use the long option names.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct OptionFile {
    pub database: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub conf: Option<PathBuf>,
    pub log: Option<PathBuf>,
    pub format: Option<String>,
    pub format_cmd: Option<String>,
    pub filter_select_type: Vec<String>,
    pub filter_no_select_type: Vec<String>,
    pub filter_table: Vec<String>,
    pub filter_no_table: Vec<String>,
    pub filter_type: Vec<String>,
    pub filter_no_type: Vec<String>,
    pub filter_possible_keys: Vec<String>,
    pub filter_no_possible_keys: Vec<String>,
    pub filter_key: Vec<String>,
    pub filter_no_key: Vec<String>,
    pub filter_extra: Vec<String>,
    pub filter_no_extra: Vec<String>,
    pub use_table_map: bool,
    pub update_table_map: bool,
    pub ignore_error: bool,
    pub combine_sql: bool,
    pub output: Option<OutputFormat>,
}

impl OptionFile {
    /// Reads an option file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read option file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid option file {}", path.display()))
    }

    /// Parses option file contents.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Everything a run needs, after merging all option layers.
#[derive(Debug)]
pub struct Settings {
    pub mode: Mode,
    pub sql: Option<String>,
    pub run: RunOptions,
    pub filter: FilterSpec,
    pub log_path: Option<PathBuf>,
    pub output: OutputFormat,
    pub verbose: bool,
}

fn pick<T>(flag: Option<T>, file: Option<T>) -> Option<T> {
    flag.or(file)
}

fn pick_list(flag: Vec<String>, file: Vec<String>) -> Vec<String> {
    if flag.is_empty() {
        file
    } else {
        flag
    }
}

impl Settings {
    /// Merges command-line arguments over the option file and applies the
    /// mode rules.
    pub fn merge(args: ExplainArgs, file: OptionFile) -> Result<Self> {
        let sql = args.sql.filter(|s| !s.trim().is_empty());
        if args.mode == Mode::Simple && sql.is_none() {
            bail!("A SQL statement is required in simple mode");
        }

        let fixed = ConnectionDescriptor::new(
            pick(args.host, file.host).unwrap_or_default(),
            pick(args.database, file.database).unwrap_or_default(),
            pick(args.user, file.user).unwrap_or_default(),
            pick(args.pass, file.pass).unwrap_or_default(),
        )
        .with_port(pick(args.port, file.port).unwrap_or(DEFAULT_MYSQL_PORT));

        let use_table_map = args.use_table_map || file.use_table_map;
        let use_mapping = match args.mode {
            Mode::Simple => !fixed.is_complete(),
            Mode::Log | Mode::LogDb => use_table_map || !fixed.is_complete(),
        };

        let format_cmd = pick(args.format_cmd, file.format_cmd);
        let format = match (args.format, file.format) {
            _ if format_cmd.is_some() => FormatKind::Command,
            (Some(format), _) => format,
            (None, Some(text)) => text.parse().map_err(anyhow::Error::msg)?,
            (None, None) => FormatKind::default(),
        };

        let log_path = pick(args.log, file.log);
        if args.mode == Mode::Log && log_path.is_none() {
            bail!("A log file is required in log mode (use --log or EXPL_LOG)");
        }

        let mapping_path = pick(args.conf, file.conf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MAPPING_FILE));

        let mut run = RunOptions::new()
            .with_fixed_target(fixed)
            .with_refresh_mapping(args.update_table_map || file.update_table_map)
            .with_ignore_errors(args.ignore_error || file.ignore_error)
            .with_dedupe(args.combine_sql || file.combine_sql)
            .with_format(format);
        run.mapping_path = mapping_path;
        run.use_mapping = use_mapping;
        run.format_command = format_cmd;

        let filter = FilterSpec::new()
            .include(
                Attribute::SelectType,
                pick_list(args.filter_select_type, file.filter_select_type),
            )
            .exclude(
                Attribute::SelectType,
                pick_list(args.filter_no_select_type, file.filter_no_select_type),
            )
            .include(Attribute::Table, pick_list(args.filter_table, file.filter_table))
            .exclude(
                Attribute::Table,
                pick_list(args.filter_no_table, file.filter_no_table),
            )
            .include(Attribute::AccessType, pick_list(args.filter_type, file.filter_type))
            .exclude(
                Attribute::AccessType,
                pick_list(args.filter_no_type, file.filter_no_type),
            )
            .include(
                Attribute::PossibleKeys,
                pick_list(args.filter_possible_keys, file.filter_possible_keys),
            )
            .exclude(
                Attribute::PossibleKeys,
                pick_list(args.filter_no_possible_keys, file.filter_no_possible_keys),
            )
            .include(Attribute::Key, pick_list(args.filter_key, file.filter_key))
            .exclude(Attribute::Key, pick_list(args.filter_no_key, file.filter_no_key))
            .include(Attribute::Extra, pick_list(args.filter_extra, file.filter_extra))
            .exclude(
                Attribute::Extra,
                pick_list(args.filter_no_extra, file.filter_no_extra),
            );

        Ok(Self {
            mode: args.mode,
            sql,
            run,
            filter,
            log_path,
            output: pick(args.output, file.output).unwrap_or_default(),
            verbose: args.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Commands};
    use clap::Parser;

    fn explain_args(argv: &[&str]) -> ExplainArgs {
        let mut full = vec!["expl", "explain"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Explain(args) => args,
        }
    }

    #[test]
    fn test_simple_requires_sql() {
        let args = explain_args(&["simple"]);
        assert!(Settings::merge(args, OptionFile::default()).is_err());
    }

    #[test]
    fn test_simple_with_complete_target_disables_mapping() {
        let args = explain_args(&[
            "simple", "SELECT 1", "-U", "-d", "app", "-H", "localhost", "-u", "root",
        ]);
        let settings = Settings::merge(args, OptionFile::default()).unwrap();

        assert!(!settings.run.use_mapping);
        assert_eq!(settings.run.fixed.database, "app");
        assert_eq!(settings.run.fixed.port, DEFAULT_MYSQL_PORT);
    }

    #[test]
    fn test_simple_with_partial_target_uses_mapping() {
        let args = explain_args(&["simple", "SELECT 1", "-d", "app"]);
        let settings = Settings::merge(args, OptionFile::default()).unwrap();
        assert!(settings.run.use_mapping);

        let args = explain_args(&["simple", "SELECT * FROM user"]);
        let settings = Settings::merge(args, OptionFile::default()).unwrap();
        assert!(settings.run.use_mapping);
        assert!(settings.run.validate().is_ok());
    }

    #[test]
    fn test_log_mode_defaults_to_mapping() {
        let args = explain_args(&["log", "-l", "general.log", "-C", "-I"]);
        let settings = Settings::merge(args, OptionFile::default()).unwrap();

        assert!(settings.run.use_mapping);
        assert!(settings.run.dedupe);
        assert!(settings.run.ignore_errors);
        assert_eq!(settings.run.mapping_path, PathBuf::from(DEFAULT_MAPPING_FILE));
    }

    #[test]
    fn test_log_mode_requires_log_file() {
        let mut args = explain_args(&["log"]);
        args.log = None;
        assert!(Settings::merge(args, OptionFile::default()).is_err());
    }

    #[test]
    fn test_format_command_selects_command_format() {
        let args = explain_args(&["simple", "x", "-f", "official", "--format-cmd", "cat"]);
        let settings = Settings::merge(args, OptionFile::default()).unwrap();

        assert_eq!(settings.run.format, FormatKind::Command);
        assert_eq!(settings.run.format_command.as_deref(), Some("cat"));
    }

    #[test]
    fn test_filters_are_comma_separated() {
        let args = explain_args(&["simple", "x", "--filter-no-type", "ALL,index", "--filter-table", "user"]);
        let settings = Settings::merge(args, OptionFile::default()).unwrap();

        let access = settings.filter.attribute(Attribute::AccessType);
        assert!(access.excluded().contains("all"));
        assert!(access.excluded().contains("index"));
        assert!(settings.filter.attribute(Attribute::Table).included().contains("user"));
    }

    #[test]
    fn test_option_file_fills_missing_values() {
        let file = OptionFile::parse(
            r#"
            database = "app"
            host = "db.internal"
            user = "reader"
            format = "official"
            combine-sql = true
            filter-no-type = ["ALL"]
            output = "json"
            "#,
        )
        .unwrap();
        let args = explain_args(&["simple", "SELECT 1", "-d", "other"]);
        let settings = Settings::merge(args, file).unwrap();

        assert_eq!(settings.run.fixed.database, "other");
        assert_eq!(settings.run.fixed.host, "db.internal");
        assert_eq!(settings.run.format, FormatKind::ServerLog);
        assert!(settings.run.dedupe);
        assert!(!settings.run.use_mapping);
        assert_eq!(settings.output, OutputFormat::Json);
        assert!(!settings.filter.is_empty());
    }

    #[test]
    fn test_option_file_rejects_unknown_keys() {
        assert!(OptionFile::parse("colour = true").is_err());
    }

    #[test]
    fn test_option_file_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expl.toml");
        std::fs::write(&path, "ignore-error = true\n").unwrap();

        let file = OptionFile::load(&path).unwrap();
        assert!(file.ignore_error);
        assert!(OptionFile::load(&dir.path().join("missing.toml")).is_err());
    }
}
