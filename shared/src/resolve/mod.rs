//! Database resolution.
//!
//! Decides which database each statement is explained against. In fixed mode
//! every statement goes to the descriptor from [`RunOptions`]; in mapping mode
//! the first table of the statement is looked up in the table mapping.
//!
//! The mapping is prepared by [`initialize`] before a run starts: an optional
//! refresh, then a load. Either failure is a [`ConfigError`] and ends the run
//! before any statement is explained. After that the resolver is read-only.

mod mapping;
mod table;

pub use mapping::{
    DatabaseTables, FileMappingStore, InMemoryMappingStore, MappingError, MappingStore,
    TableCatalog, TableMapping,
};
pub use table::{first_table, TableRef};

use crate::config::{ConfigError, RunOptions};
use crate::models::ConnectionDescriptor;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use validator::Validate;

/// Errors that can occur while resolving a single statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// The statement names no table.
    #[error("No table reference found in statement")]
    NoTableReference,

    /// The statement's table is absent from the mapping.
    #[error("Table '{0}' is not mapped to any database")]
    TableNotMapped(String),
}

#[derive(Debug)]
struct MappingIndex {
    /// Table name to candidate databases, in mapping order.
    tables: HashMap<String, Vec<ConnectionDescriptor>>,
    targets: Vec<ConnectionDescriptor>,
}

impl MappingIndex {
    fn build(mapping: TableMapping) -> Self {
        let mut tables: HashMap<String, Vec<ConnectionDescriptor>> = HashMap::new();
        let mut targets = Vec::with_capacity(mapping.databases.len());

        for db in mapping.databases {
            for table in db.tables {
                tables.entry(table).or_default().push(db.target.clone());
            }
            targets.push(db.target);
        }

        Self { tables, targets }
    }
}

#[derive(Debug, Clone)]
enum Mode {
    Fixed(ConnectionDescriptor),
    Mapped(Arc<MappingIndex>),
}

/// Resolves statements to connection descriptors.
///
/// Cloning is cheap; clones share the loaded mapping.
///
/// # Example
///
/// ```
/// use shared::models::ConnectionDescriptor;
/// use shared::resolve::{DatabaseResolver, TableMapping};
///
/// let app = ConnectionDescriptor::new("db1", "app", "root", "");
/// let resolver = DatabaseResolver::from_mapping(
///     TableMapping::new().with_database(app.clone(), ["user"]),
/// );
///
/// assert_eq!(resolver.resolve("SELECT * FROM user").unwrap(), &app);
/// assert!(resolver.resolve("SELECT * FROM invoice").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseResolver {
    mode: Mode,
}

impl DatabaseResolver {
    /// Creates a resolver that sends every statement to `target`.
    #[must_use]
    pub fn fixed(target: ConnectionDescriptor) -> Self {
        Self {
            mode: Mode::Fixed(target),
        }
    }

    /// Creates a resolver that looks statements up in `mapping`.
    #[must_use]
    pub fn from_mapping(mapping: TableMapping) -> Self {
        Self {
            mode: Mode::Mapped(Arc::new(MappingIndex::build(mapping))),
        }
    }

    /// Returns true in mapping mode.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        matches!(self.mode, Mode::Mapped(_))
    }

    /// Returns every database the resolver can send statements to, without
    /// duplicates, in configuration order.
    #[must_use]
    pub fn targets(&self) -> Vec<ConnectionDescriptor> {
        match &self.mode {
            Mode::Fixed(target) => vec![target.clone()],
            Mode::Mapped(index) => {
                let mut targets: Vec<ConnectionDescriptor> = Vec::new();
                for target in &index.targets {
                    if !targets.contains(target) {
                        targets.push(target.clone());
                    }
                }
                targets
            }
        }
    }

    /// Returns one connection per database server, in configuration order.
    ///
    /// Databases sharing a host and port share one server, and with it one
    /// general query log; the first configured database stands for the server.
    #[must_use]
    pub fn log_targets(&self) -> Vec<ConnectionDescriptor> {
        let mut servers: Vec<ConnectionDescriptor> = Vec::new();
        for target in self.targets() {
            if !servers
                .iter()
                .any(|s| s.host == target.host && s.port == target.port)
            {
                servers.push(target);
            }
        }
        servers
    }

    /// Resolves the database for one SQL statement.
    ///
    /// A schema-qualified table (`app.user`) prefers the mapped database of
    /// that name; otherwise the first database listing the table wins.
    ///
    /// # Errors
    ///
    /// Returns an error in mapping mode if the statement names no table or
    /// its table is not mapped.
    pub fn resolve(&self, sql: &str) -> Result<&ConnectionDescriptor, ResolutionError> {
        let index = match &self.mode {
            Mode::Fixed(target) => return Ok(target),
            Mode::Mapped(index) => index,
        };

        let table_ref = first_table(sql).ok_or(ResolutionError::NoTableReference)?;
        let candidates = index
            .tables
            .get(&table_ref.table)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ResolutionError::TableNotMapped(table_ref.to_string()))?;

        let preferred = table_ref
            .schema
            .as_deref()
            .and_then(|schema| candidates.iter().find(|c| c.database == schema));

        Ok(preferred.unwrap_or(&candidates[0]))
    }
}

/// Prepares the resolver for a run.
///
/// In mapping mode the mapping is refreshed first when
/// [`RunOptions::refresh_mapping`] is set, then loaded. This happens once per
/// run, never per statement.
///
/// # Errors
///
/// Returns a [`ConfigError`] if:
/// - Mapping mode is off and the fixed descriptor is incomplete
/// - The mapping refresh fails
/// - The mapping cannot be loaded
pub async fn initialize(
    options: &RunOptions,
    store: &dyn MappingStore,
) -> Result<DatabaseResolver, ConfigError> {
    if !options.use_mapping {
        options.fixed.validate()?;
        tracing::debug!(target_db = %options.fixed, "Using fixed database");
        return Ok(DatabaseResolver::fixed(options.fixed.clone()));
    }

    if options.refresh_mapping {
        store.reload().await.map_err(ConfigError::MappingRefresh)?;
        tracing::info!(path = %options.mapping_path.display(), "Table mapping refreshed");
    }

    let mapping = store.load().await.map_err(ConfigError::MappingLoad)?;
    tracing::info!(
        databases = mapping.databases.len(),
        tables = mapping.table_count(),
        "Table mapping loaded"
    );
    Ok(DatabaseResolver::from_mapping(mapping))
}
