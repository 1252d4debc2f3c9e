//! Combining identical statements.
//!
//! When active, the aggregator keys results by their normalized SQL text
//! (whitespace collapsed, case preserved). The first occurrence of a key is
//! kept as the representative record; later occurrences only bump its count
//! and their rows are discarded. When inactive every result passes through
//! untouched.

use crate::models::ExplainResult;
use std::collections::HashMap;

/// What [`DedupAggregator::add`] did with a result.
#[derive(Debug, PartialEq)]
pub enum Aggregate<'a> {
    /// Aggregation is off; the result is handed back for immediate use.
    PassThrough(ExplainResult),
    /// The result was folded into this record.
    Combined(&'a ExplainResult),
}

/// Collapses identical SQL texts into one record with an occurrence count.
///
/// # Example
///
/// ```
/// use shared::dedupe::{Aggregate, DedupAggregator};
/// use shared::models::ExplainResult;
///
/// let mut aggregator = DedupAggregator::new(true);
/// aggregator.add(ExplainResult::new("SELECT * FROM user", "app", vec![]));
///
/// match aggregator.add(ExplainResult::new("SELECT *  FROM user", "app", vec![])) {
///     Aggregate::Combined(record) => assert_eq!(record.count, 2),
///     Aggregate::PassThrough(_) => unreachable!(),
/// }
/// assert_eq!(aggregator.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct DedupAggregator {
    active: bool,
    index: HashMap<String, usize>,
    records: Vec<ExplainResult>,
}

impl DedupAggregator {
    /// Creates an aggregator; an inactive one is the identity transform.
    #[must_use]
    pub fn new(active: bool) -> Self {
        Self {
            active,
            ..Self::default()
        }
    }

    /// Returns true if results are being combined.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Adds one result.
    pub fn add(&mut self, mut result: ExplainResult) -> Aggregate<'_> {
        if !self.active {
            return Aggregate::PassThrough(result);
        }

        let key = result.normalized_sql();
        let position = match self.index.get(&key) {
            Some(&position) => {
                self.records[position].count += 1;
                position
            }
            None => {
                result.count = 1;
                self.records.push(result);
                self.index.insert(key, self.records.len() - 1);
                self.records.len() - 1
            }
        };
        Aggregate::Combined(&self.records[position])
    }

    /// Returns the count recorded for `sql`, compared after normalization.
    #[must_use]
    pub fn count_of(&self, sql: &str) -> Option<u64> {
        self.index
            .get(&crate::models::normalize_sql(sql))
            .map(|&position| self.records[position].count)
    }

    /// Number of distinct statements held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Takes the combined records out in first-seen order.
    pub fn drain(&mut self) -> Vec<ExplainResult> {
        self.index.clear();
        std::mem::take(&mut self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExplainRow;

    fn explain(sql: &str, table: &str) -> ExplainResult {
        ExplainResult::new(sql, "app", vec![ExplainRow::new("SIMPLE", table)])
    }

    #[test]
    fn test_inactive_is_identity() {
        let mut aggregator = DedupAggregator::new(false);
        let first = explain("SELECT 1", "a");

        assert_eq!(
            aggregator.add(first.clone()),
            Aggregate::PassThrough(first.clone())
        );
        assert_eq!(aggregator.add(first.clone()), Aggregate::PassThrough(first));
        assert!(aggregator.is_empty());
        assert!(!aggregator.is_active());
    }

    #[test]
    fn test_first_rows_are_kept() {
        let mut aggregator = DedupAggregator::new(true);
        aggregator.add(explain("SELECT * FROM t", "first"));
        aggregator.add(explain("SELECT  *\nFROM t", "second"));

        let records = aggregator.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].count, 2);
        assert_eq!(records[0].rows[0].table.as_deref(), Some("first"));
        assert_eq!(records[0].sql, "SELECT * FROM t");
    }

    #[test]
    fn test_case_is_significant() {
        let mut aggregator = DedupAggregator::new(true);
        aggregator.add(explain("SELECT 1", "t"));
        aggregator.add(explain("select 1", "t"));
        assert_eq!(aggregator.len(), 2);
    }

    #[test]
    fn test_counts_are_order_independent() {
        let texts = ["SELECT a", "SELECT b", "SELECT  a", "SELECT a", "SELECT\tb"];

        let mut forward = DedupAggregator::new(true);
        for text in texts {
            forward.add(explain(text, "t"));
        }
        let mut backward = DedupAggregator::new(true);
        for text in texts.iter().rev() {
            backward.add(explain(text, "t"));
        }

        for aggregator in [&forward, &backward] {
            assert_eq!(aggregator.count_of("SELECT a"), Some(3));
            assert_eq!(aggregator.count_of("SELECT b"), Some(2));
            assert_eq!(aggregator.count_of("SELECT c"), None);
        }
    }

    #[test]
    fn test_drain_preserves_first_seen_order() {
        let mut aggregator = DedupAggregator::new(true);
        for text in ["SELECT 2", "SELECT 1", "SELECT 2"] {
            aggregator.add(explain(text, "t"));
        }

        let sqls: Vec<String> = aggregator.drain().into_iter().map(|r| r.sql).collect();
        assert_eq!(sqls, vec!["SELECT 2", "SELECT 1"]);
        assert!(aggregator.is_empty());
    }
}
