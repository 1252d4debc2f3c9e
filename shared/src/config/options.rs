//! Options governing one pipeline run.

use crate::format::FormatKind;
use crate::models::ConnectionDescriptor;
use crate::resolve::MappingError;
use std::path::PathBuf;
use thiserror::Error;
use validator::Validate;

/// Mapping file used when none is configured.
pub const DEFAULT_MAPPING_FILE: &str = "table_map.toml";

/// Errors that make a run impossible before or during initialization.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The fixed connection descriptor is incomplete.
    #[error("Invalid connection settings: {0}")]
    InvalidConnection(#[from] validator::ValidationErrors),

    /// The `command` format was selected without a command.
    #[error("Format 'command' requires a format command")]
    MissingFormatCommand,

    /// The table mapping could not be loaded.
    #[error("Failed to load table mapping: {0}")]
    MappingLoad(#[source] MappingError),

    /// The table mapping could not be refreshed from the live databases.
    #[error("Failed to refresh table mapping: {0}")]
    MappingRefresh(#[source] MappingError),
}

/// Immutable configuration for one invocation.
///
/// # Example
///
/// ```
/// use shared::config::RunOptions;
/// use shared::models::ConnectionDescriptor;
///
/// let options = RunOptions::new()
///     .with_fixed_target(ConnectionDescriptor::new("127.0.0.1", "app", "root", ""))
///     .with_ignore_errors(true);
///
/// assert!(!options.use_mapping);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Descriptor used for every statement when mapping mode is off.
    pub fixed: ConnectionDescriptor,

    /// Location of the table to database mapping.
    pub mapping_path: PathBuf,

    /// Resolve each statement's database through the table mapping.
    pub use_mapping: bool,

    /// Rebuild the mapping from the live databases once before the run.
    pub refresh_mapping: bool,

    /// Report per-statement failures and keep going instead of aborting.
    pub ignore_errors: bool,

    /// Collapse identical statements into one record with a count.
    pub dedupe: bool,

    /// How raw statements are turned into SQL.
    pub format: FormatKind,

    /// Shell command used by [`FormatKind::Command`].
    pub format_command: Option<String>,
}

impl RunOptions {
    /// Creates options with fixed-database resolution and every flag off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fixed target and disables mapping mode.
    #[must_use]
    pub fn with_fixed_target(mut self, target: ConnectionDescriptor) -> Self {
        self.fixed = target;
        self.use_mapping = false;
        self
    }

    /// Enables mapping mode with the given mapping location.
    #[must_use]
    pub fn with_mapping(mut self, path: impl Into<PathBuf>) -> Self {
        self.mapping_path = path.into();
        self.use_mapping = true;
        self
    }

    /// Sets whether the mapping is refreshed before the run.
    #[must_use]
    pub fn with_refresh_mapping(mut self, refresh: bool) -> Self {
        self.refresh_mapping = refresh;
        self
    }

    /// Sets the failure tolerance policy.
    #[must_use]
    pub fn with_ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    /// Sets whether identical statements are combined.
    #[must_use]
    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    /// Sets the statement format.
    #[must_use]
    pub fn with_format(mut self, format: FormatKind) -> Self {
        self.format = format;
        self
    }

    /// Sets the format command and selects [`FormatKind::Command`].
    #[must_use]
    pub fn with_format_command(mut self, command: impl Into<String>) -> Self {
        self.format_command = Some(command.into());
        self.format = FormatKind::Command;
        self
    }

    /// Checks the options for consistency.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Mapping mode is off and the fixed descriptor lacks host, database or user
    /// - The `command` format is selected without a command
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.use_mapping {
            self.fixed.validate()?;
        }
        if self.format == FormatKind::Command
            && self
                .format_command
                .as_deref()
                .map_or(true, |c| c.trim().is_empty())
        {
            return Err(ConfigError::MissingFormatCommand);
        }
        Ok(())
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            fixed: ConnectionDescriptor::default(),
            mapping_path: PathBuf::from(DEFAULT_MAPPING_FILE),
            use_mapping: false,
            refresh_mapping: false,
            ignore_errors: false,
            dedupe: false,
            format: FormatKind::Plain,
            format_command: None,
        }
    }
}
