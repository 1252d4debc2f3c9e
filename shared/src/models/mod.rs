//! Data models for the expl pipeline.
//!
//! This module contains the values that flow through a run: raw and resolved
//! statements, connection descriptors and EXPLAIN results.

pub mod connection;
pub mod explain;
pub mod statement;

pub use connection::{ConnectionDescriptor, DEFAULT_MYSQL_PORT};
pub use explain::{normalize_sql, ExplainResult, ExplainRow};
pub use statement::{Provenance, RawStatement, ResolvedStatement};
