//! Connection descriptor model.
//!
//! Identifies one target database: where it lives and how to log into it.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Default MySQL TCP port.
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

fn default_port() -> u16 {
    DEFAULT_MYSQL_PORT
}

/// Connection parameters for one database.
///
/// Descriptors are used as cache keys by the explain engine, so two statements
/// resolved to equal descriptors share a connection for the run.
///
/// # Example
///
/// ```
/// use shared::models::ConnectionDescriptor;
///
/// let target = ConnectionDescriptor::new("127.0.0.1", "app", "root", "secret");
/// assert_eq!(target.port, 3306);
/// assert!(target.is_complete());
/// assert_eq!(target.to_string(), "root@127.0.0.1:3306/app");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Validate)]
pub struct ConnectionDescriptor {
    /// Host name or IP address.
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database (schema) name.
    #[validate(length(min = 1, message = "Database cannot be empty"))]
    pub database: String,

    /// User name.
    #[validate(length(min = 1, message = "User cannot be empty"))]
    pub user: String,

    /// Password, may be empty.
    #[serde(default)]
    pub password: String,
}

impl ConnectionDescriptor {
    /// Creates a descriptor on the default port.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_MYSQL_PORT,
            database: database.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Sets the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Returns true when host, database and user are all set.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }
}

impl Default for ConnectionDescriptor {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_MYSQL_PORT,
            database: String::new(),
            user: String::new(),
            password: String::new(),
        }
    }
}

impl std::fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

// Password stays out of logs.
impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_complete() {
        let target = ConnectionDescriptor::new("localhost", "app", "root", "");
        assert!(target.is_complete());
    }

    #[test]
    fn test_descriptor_missing_fields() {
        assert!(!ConnectionDescriptor::default().is_complete());

        let no_user = ConnectionDescriptor::new("localhost", "app", "", "pw");
        assert!(!no_user.is_complete());

        let no_db = ConnectionDescriptor::new("localhost", "", "root", "pw");
        let errors = no_db.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("database"));
    }

    #[test]
    fn test_descriptor_debug_hides_password() {
        let target = ConnectionDescriptor::new("localhost", "app", "root", "hunter2");
        let debug = format!("{target:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("localhost"));
    }

    #[test]
    fn test_descriptor_deserialization_defaults() {
        let json = r#"{"host": "db1", "database": "app", "user": "root"}"#;
        let target: ConnectionDescriptor = serde_json::from_str(json).unwrap();

        assert_eq!(target.port, DEFAULT_MYSQL_PORT);
        assert!(target.password.is_empty());
    }

    #[test]
    fn test_descriptor_with_port() {
        let target = ConnectionDescriptor::new("db1", "app", "root", "").with_port(3307);
        assert_eq!(target.to_string(), "root@db1:3307/app");
    }
}
