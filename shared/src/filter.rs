//! Result filtering.
//!
//! A [`FilterSpec`] holds an include set and an exclude set for each of six
//! EXPLAIN attributes. A result is kept when at least one of its rows
//! satisfies every attribute rule:
//!
//! - a non-empty include set requires the row's value to equal one member
//! - a non-empty exclude set requires the row's value to equal no member
//!
//! Comparison is case-insensitive. `NULL` columns compare as the empty
//! string. For the list-valued columns (`possible_keys`, `extra`) a member
//! also matches a single element of the list.
//!
//! # Example
//!
//! ```
//! use shared::filter::{Attribute, FilterSpec};
//! use shared::models::{ExplainResult, ExplainRow};
//!
//! let spec = FilterSpec::new()
//!     .include(Attribute::Table, ["user"])
//!     .exclude(Attribute::AccessType, ["ALL"]);
//!
//! let scan = ExplainResult::new("SELECT * FROM user", "app", vec![
//!     ExplainRow::new("SIMPLE", "user").with_access_type("ALL"),
//! ]);
//! let lookup = ExplainResult::new("SELECT * FROM user WHERE id = 1", "app", vec![
//!     ExplainRow::new("SIMPLE", "user").with_access_type("ref"),
//! ]);
//!
//! assert!(!spec.passes(&scan));
//! assert!(spec.passes(&lookup));
//! ```

use crate::models::{ExplainResult, ExplainRow};
use std::collections::BTreeSet;

/// The EXPLAIN columns a filter can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// `select_type`
    SelectType,
    /// `table`
    Table,
    /// `type`
    AccessType,
    /// `possible_keys`
    PossibleKeys,
    /// `key`
    Key,
    /// `Extra`
    Extra,
}

impl Attribute {
    /// Every attribute, in EXPLAIN column order.
    pub const ALL: [Self; 6] = [
        Self::SelectType,
        Self::Table,
        Self::AccessType,
        Self::PossibleKeys,
        Self::Key,
        Self::Extra,
    ];

    /// Returns the row's value for this attribute; `NULL` is empty.
    #[must_use]
    pub fn value<'a>(&self, row: &'a ExplainRow) -> &'a str {
        match self {
            Self::SelectType => &row.select_type,
            Self::Table => row.table.as_deref().unwrap_or_default(),
            Self::AccessType => row.access_type.as_deref().unwrap_or_default(),
            Self::PossibleKeys => row.possible_keys.as_deref().unwrap_or_default(),
            Self::Key => row.key.as_deref().unwrap_or_default(),
            Self::Extra => row.extra.as_deref().unwrap_or_default(),
        }
    }

    fn separator(self) -> Option<char> {
        match self {
            Self::PossibleKeys => Some(','),
            Self::Extra => Some(';'),
            Self::SelectType | Self::Table | Self::AccessType | Self::Key => None,
        }
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelectType => write!(f, "select-type"),
            Self::Table => write!(f, "table"),
            Self::AccessType => write!(f, "type"),
            Self::PossibleKeys => write!(f, "possible-keys"),
            Self::Key => write!(f, "key"),
            Self::Extra => write!(f, "extra"),
        }
    }
}

/// Include and exclude sets for one attribute.
///
/// Members are stored trimmed and lowercased; blank members are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeFilter {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
}

fn normalize_members<I, S>(values: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

impl AttributeFilter {
    /// Returns true if neither set has members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Members of the include set.
    #[must_use]
    pub fn included(&self) -> &BTreeSet<String> {
        &self.include
    }

    /// Members of the exclude set.
    #[must_use]
    pub fn excluded(&self) -> &BTreeSet<String> {
        &self.exclude
    }

    fn matches_any(set: &BTreeSet<String>, value: &str, separator: Option<char>) -> bool {
        let value = value.trim().to_lowercase();
        if set.contains(&value) {
            return true;
        }
        separator.is_some_and(|sep| value.split(sep).any(|part| set.contains(part.trim())))
    }

    /// Evaluates this attribute's rule against one value.
    fn allows(&self, value: &str, separator: Option<char>) -> bool {
        if !self.include.is_empty() && !Self::matches_any(&self.include, value, separator) {
            return false;
        }
        if !self.exclude.is_empty() && Self::matches_any(&self.exclude, value, separator) {
            return false;
        }
        true
    }
}

/// Include/exclude sets for every filterable attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    select_type: AttributeFilter,
    table: AttributeFilter,
    access_type: AttributeFilter,
    possible_keys: AttributeFilter,
    key: AttributeFilter,
    extra: AttributeFilter,
}

impl FilterSpec {
    /// Creates a filter that keeps everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds members to the include set of `attribute`.
    #[must_use]
    pub fn include<I, S>(mut self, attribute: Attribute, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.attribute_mut(attribute)
            .include
            .extend(normalize_members(values));
        self
    }

    /// Adds members to the exclude set of `attribute`.
    #[must_use]
    pub fn exclude<I, S>(mut self, attribute: Attribute, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.attribute_mut(attribute)
            .exclude
            .extend(normalize_members(values));
        self
    }

    /// Returns the sets of one attribute.
    #[must_use]
    pub fn attribute(&self, attribute: Attribute) -> &AttributeFilter {
        match attribute {
            Attribute::SelectType => &self.select_type,
            Attribute::Table => &self.table,
            Attribute::AccessType => &self.access_type,
            Attribute::PossibleKeys => &self.possible_keys,
            Attribute::Key => &self.key,
            Attribute::Extra => &self.extra,
        }
    }

    fn attribute_mut(&mut self, attribute: Attribute) -> &mut AttributeFilter {
        match attribute {
            Attribute::SelectType => &mut self.select_type,
            Attribute::Table => &mut self.table,
            Attribute::AccessType => &mut self.access_type,
            Attribute::PossibleKeys => &mut self.possible_keys,
            Attribute::Key => &mut self.key,
            Attribute::Extra => &mut self.extra,
        }
    }

    /// Returns true if no attribute is constrained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        Attribute::ALL.iter().all(|a| self.attribute(*a).is_empty())
    }

    /// Returns true if `row` satisfies every attribute rule.
    #[must_use]
    pub fn row_passes(&self, row: &ExplainRow) -> bool {
        Attribute::ALL.iter().all(|attribute| {
            self.attribute(*attribute)
                .allows(attribute.value(row), attribute.separator())
        })
    }

    /// Returns true if at least one row of `result` satisfies every rule.
    ///
    /// An empty spec keeps every result, including one without rows.
    #[must_use]
    pub fn passes(&self, result: &ExplainResult) -> bool {
        self.is_empty() || result.rows.iter().any(|row| self.row_passes(row))
    }
}

/// Returns true if `result` is kept by `spec`.
#[must_use]
pub fn passes(result: &ExplainResult, spec: &FilterSpec) -> bool {
    spec.passes(result)
}
