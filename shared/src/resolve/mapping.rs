//! Table to database mapping store.
//!
//! The mapping tells the resolver which database holds each table. It is kept
//! in a TOML file:
//!
//! ```toml
//! [[database]]
//! host = "127.0.0.1"
//! port = 3306
//! database = "app"
//! user = "root"
//! password = ""
//! tables = ["user", "group"]
//! ```
//!
//! The `tables` lists can be rebuilt from the live databases with
//! [`MappingStore::reload`].

use crate::models::ConnectionDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors that can occur during mapping store operations.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The mapping file could not be read.
    #[error("Cannot read mapping file {}: {source}", .path.display())]
    Read {
        /// Mapping file location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The mapping file could not be written.
    #[error("Cannot write mapping file {}: {source}", .path.display())]
    Write {
        /// Mapping file location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The mapping file is not valid TOML or has the wrong shape.
    #[error("Invalid mapping file {}: {source}", .path.display())]
    Parse {
        /// Mapping file location.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// The mapping could not be serialized.
    #[error("Cannot serialize mapping: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Listing the tables of a live database failed.
    #[error("Cannot list tables of {target}: {message}")]
    Catalog {
        /// The database that was queried.
        target: String,
        /// Driver error message.
        message: String,
    },

    /// Failed to acquire lock on the store.
    #[error("Failed to acquire lock on mapping store")]
    LockError,
}

/// One database and the tables it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseTables {
    /// How to reach the database.
    #[serde(flatten)]
    pub target: ConnectionDescriptor,

    /// Tables living in this database.
    #[serde(default)]
    pub tables: Vec<String>,
}

/// The full table to database mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    /// Databases in file order. Earlier entries win when a table name is
    /// present in more than one database.
    #[serde(default, rename = "database")]
    pub databases: Vec<DatabaseTables>,
}

impl TableMapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a database with its tables.
    #[must_use]
    pub fn with_database<I, S>(mut self, target: ConnectionDescriptor, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.databases.push(DatabaseTables {
            target,
            tables: tables.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Parses a mapping from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid mapping.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, MappingError> {
        toml::from_str(text).map_err(|source| MappingError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Serializes the mapping to TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, MappingError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Returns the number of mapped tables across all databases.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.databases.iter().map(|db| db.tables.len()).sum()
    }
}

/// Lists the tables of a live database.
///
/// Used by [`FileMappingStore::reload`] to rebuild the mapping.
#[async_trait]
pub trait TableCatalog: Send + Sync {
    /// Returns the table names of the target database.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::Catalog`] if the database cannot be queried.
    async fn list_tables(&self, target: &ConnectionDescriptor) -> Result<Vec<String>, MappingError>;
}

/// Source of the table mapping.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Loads the current mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping cannot be read or parsed.
    async fn load(&self) -> Result<TableMapping, MappingError>;

    /// Rebuilds the mapping from the live database environment.
    ///
    /// # Errors
    ///
    /// Returns an error if any database cannot be queried or the rebuilt
    /// mapping cannot be stored.
    async fn reload(&self) -> Result<(), MappingError>;
}

/// TOML file backed mapping store.
#[derive(Debug, Clone)]
pub struct FileMappingStore<C> {
    path: PathBuf,
    catalog: C,
}

impl<C: TableCatalog> FileMappingStore<C> {
    /// Creates a store for the mapping file at `path`, refreshed through `catalog`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, catalog: C) -> Self {
        Self {
            path: path.into(),
            catalog,
        }
    }

    /// Returns the mapping file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl<C: TableCatalog> MappingStore for FileMappingStore<C> {
    async fn load(&self) -> Result<TableMapping, MappingError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| MappingError::Read {
                path: self.path.clone(),
                source,
            })?;
        let mapping = TableMapping::from_toml(&text, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            databases = mapping.databases.len(),
            tables = mapping.table_count(),
            "Loaded table mapping"
        );
        Ok(mapping)
    }

    async fn reload(&self) -> Result<(), MappingError> {
        let mut mapping = self.load().await?;

        for db in &mut mapping.databases {
            let mut tables = self.catalog.list_tables(&db.target).await?;
            tables.sort();
            tracing::info!(target_db = %db.target, tables = tables.len(), "Refreshed table list");
            db.tables = tables;
        }

        let text = mapping.to_toml()?;
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|source| MappingError::Write {
                path: self.path.clone(),
                source,
            })?;
        Ok(())
    }
}

/// In-memory mapping store.
///
/// Useful for tests and for callers that build the mapping programmatically.
/// `reload` keeps the mapping as is and only counts the call.
#[derive(Debug, Default)]
pub struct InMemoryMappingStore {
    mapping: Arc<RwLock<TableMapping>>,
    reloads: AtomicUsize,
}

impl InMemoryMappingStore {
    /// Creates a store holding `mapping`.
    #[must_use]
    pub fn new(mapping: TableMapping) -> Self {
        Self {
            mapping: Arc::new(RwLock::new(mapping)),
            reloads: AtomicUsize::new(0),
        }
    }

    /// Replaces the stored mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn replace(&self, mapping: TableMapping) -> Result<(), MappingError> {
        let mut guard = self.mapping.write().map_err(|_| MappingError::LockError)?;
        *guard = mapping;
        Ok(())
    }

    /// Returns how many times `reload` was called.
    #[must_use]
    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn load(&self) -> Result<TableMapping, MappingError> {
        let guard = self.mapping.read().map_err(|_| MappingError::LockError)?;
        Ok(guard.clone())
    }

    async fn reload(&self) -> Result<(), MappingError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticCatalog(HashMap<String, Vec<String>>);

    #[async_trait]
    impl TableCatalog for StaticCatalog {
        async fn list_tables(
            &self,
            target: &ConnectionDescriptor,
        ) -> Result<Vec<String>, MappingError> {
            self.0
                .get(&target.database)
                .cloned()
                .ok_or_else(|| MappingError::Catalog {
                    target: target.to_string(),
                    message: "unknown database".into(),
                })
        }
    }

    const MAPPING: &str = r#"
[[database]]
host = "127.0.0.1"
database = "app"
user = "root"
tables = ["user", "group"]

[[database]]
host = "10.0.0.2"
port = 3307
database = "billing"
user = "billing"
password = "pw"
tables = ["invoice"]
"#;

    #[test]
    fn test_mapping_from_toml() {
        let mapping = TableMapping::from_toml(MAPPING, Path::new("map.toml")).unwrap();

        assert_eq!(mapping.databases.len(), 2);
        assert_eq!(mapping.table_count(), 3);
        assert_eq!(mapping.databases[0].target.port, 3306);
        assert_eq!(mapping.databases[1].target.port, 3307);
        assert_eq!(mapping.databases[1].target.password, "pw");
    }

    #[test]
    fn test_mapping_parse_error_names_file() {
        let err = TableMapping::from_toml("[[database]]\nhost = 1", Path::new("bad.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_mapping_toml_roundtrip() {
        let mapping = TableMapping::new().with_database(
            ConnectionDescriptor::new("127.0.0.1", "app", "root", ""),
            ["user"],
        );
        let text = mapping.to_toml().unwrap();
        let parsed = TableMapping::from_toml(&text, Path::new("map.toml")).unwrap();
        assert_eq!(mapping, parsed);
    }

    #[tokio::test]
    async fn test_file_store_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMappingStore::new(
            dir.path().join("missing.toml"),
            StaticCatalog(HashMap::new()),
        );

        let result = store.load().await;
        assert!(matches!(result, Err(MappingError::Read { .. })));
    }

    #[tokio::test]
    async fn test_file_store_reload_rewrites_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table_map.toml");
        std::fs::write(&path, MAPPING).unwrap();

        let catalog = StaticCatalog(HashMap::from([
            ("app".to_string(), vec!["team".to_string(), "account".to_string()]),
            ("billing".to_string(), vec!["invoice".to_string()]),
        ]));
        let store = FileMappingStore::new(&path, catalog);

        tokio_test::assert_ok!(store.reload().await);

        let mapping = store.load().await.unwrap();
        assert_eq!(mapping.databases[0].tables, vec!["account", "team"]);
        assert_eq!(mapping.databases[1].tables, vec!["invoice"]);
        assert_eq!(mapping.databases[1].target.password, "pw");
    }

    #[tokio::test]
    async fn test_file_store_reload_catalog_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table_map.toml");
        std::fs::write(&path, MAPPING).unwrap();

        let store = FileMappingStore::new(&path, StaticCatalog(HashMap::new()));
        let result = store.reload().await;

        assert!(matches!(result, Err(MappingError::Catalog { .. })));
        // The file is left untouched.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), MAPPING);
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let mapping = TableMapping::new().with_database(
            ConnectionDescriptor::new("h", "app", "root", ""),
            ["user"],
        );
        let store = InMemoryMappingStore::new(mapping.clone());

        assert_eq!(store.load().await.unwrap(), mapping);
        store.reload().await.unwrap();
        assert_eq!(store.reload_count(), 1);

        store.replace(TableMapping::new()).unwrap();
        assert_eq!(store.load().await.unwrap().table_count(), 0);
    }
}
