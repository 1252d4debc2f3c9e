//! EXPLAIN result model.
//!
//! Defines `ExplainRow`, one line of MySQL's tabular EXPLAIN output, and
//! `ExplainResult`, the plan of one statement together with its occurrence count.

use serde::{Deserialize, Serialize};

/// One row of an EXPLAIN result.
///
/// Column names follow MySQL's traditional EXPLAIN format. Columns that MySQL
/// reports as `NULL` are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplainRow {
    /// Select identifier. `None` for `UNION RESULT` rows.
    pub id: Option<u64>,

    /// Select type (`SIMPLE`, `PRIMARY`, `SUBQUERY`, ...).
    pub select_type: String,

    /// Table the row refers to.
    pub table: Option<String>,

    /// Matching partitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<String>,

    /// Join/access type (`ALL`, `index`, `range`, `ref`, `eq_ref`, `const`, ...).
    #[serde(rename = "type")]
    pub access_type: Option<String>,

    /// Comma separated list of indexes the optimizer could choose from.
    pub possible_keys: Option<String>,

    /// Index actually chosen.
    pub key: Option<String>,

    /// Length of the chosen key.
    pub key_len: Option<String>,

    /// Columns or constants compared to the index.
    #[serde(rename = "ref")]
    pub reference: Option<String>,

    /// Estimated number of rows to examine.
    pub rows: Option<u64>,

    /// Estimated percentage of rows filtered by the table condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered: Option<f64>,

    /// Additional information, semicolon separated (`Using where; Using filesort`).
    pub extra: Option<String>,
}

impl ExplainRow {
    /// Creates a row with the given select type and table; every other column is `NULL`.
    ///
    /// # Example
    ///
    /// ```
    /// use shared::models::ExplainRow;
    ///
    /// let row = ExplainRow::new("SIMPLE", "user")
    ///     .with_access_type("ref")
    ///     .with_key("idx_name");
    ///
    /// assert_eq!(row.table.as_deref(), Some("user"));
    /// assert_eq!(row.access_type.as_deref(), Some("ref"));
    /// ```
    #[must_use]
    pub fn new(select_type: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            id: Some(1),
            select_type: select_type.into(),
            table: Some(table.into()),
            ..Self::default()
        }
    }

    /// Sets the access type.
    #[must_use]
    pub fn with_access_type(mut self, access_type: impl Into<String>) -> Self {
        self.access_type = Some(access_type.into());
        self
    }

    /// Sets the possible keys.
    #[must_use]
    pub fn with_possible_keys(mut self, possible_keys: impl Into<String>) -> Self {
        self.possible_keys = Some(possible_keys.into());
        self
    }

    /// Sets the chosen key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the extra column.
    #[must_use]
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Sets the estimated row count.
    #[must_use]
    pub fn with_rows(mut self, rows: u64) -> Self {
        self.rows = Some(rows);
        self
    }
}

/// The EXPLAIN output of one SQL statement.
///
/// `count` is 1 for a freshly explained statement and grows when the dedup
/// aggregator merges identical statements into this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainResult {
    /// The explained SQL text. Never empty.
    pub sql: String,

    /// Label of the database the statement was explained against.
    pub database: String,

    /// The plan rows, in the order the database reported them.
    pub rows: Vec<ExplainRow>,

    /// Number of identical statements this record stands for.
    pub count: u64,
}

impl ExplainResult {
    /// Creates a result with an occurrence count of 1.
    #[must_use]
    pub fn new(sql: impl Into<String>, database: impl Into<String>, rows: Vec<ExplainRow>) -> Self {
        Self {
            sql: sql.into(),
            database: database.into(),
            rows,
            count: 1,
        }
    }

    /// Returns the whitespace-collapsed SQL text used as the dedup key.
    #[must_use]
    pub fn normalized_sql(&self) -> String {
        normalize_sql(&self.sql)
    }
}

/// Collapses every run of whitespace into a single space and trims both ends.
///
/// Case is preserved.
///
/// # Example
///
/// ```
/// use shared::models::normalize_sql;
///
/// assert_eq!(
///     normalize_sql("SELECT *\n   FROM  user\tWHERE id = 1 "),
///     "SELECT * FROM user WHERE id = 1"
/// );
/// ```
#[must_use]
pub fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
