//! expl Shared Library
//!
//! This crate contains the EXPLAIN pipeline behind the `expl` command: it
//! reads SQL statements from an argument, a log file or a server's query
//! log, works out which database each one belongs to, runs EXPLAIN there and
//! hands the filtered, optionally combined plans to a sink.
//!
//! # Modules
//!
//! - [`models`] - Connection descriptors, statements and EXPLAIN results
//! - [`config`] - Run options and configuration errors
//! - [`source`] - Statement sources
//! - [`format`] - Raw text to SQL formatting
//! - [`resolve`] - Table mapping and database resolution
//! - [`explain`] - EXPLAIN execution
//! - [`filter`] - Attribute filters on EXPLAIN rows
//! - [`dedupe`] - Combining identical statements
//! - [`pipeline`] - Run orchestration
//! - [`mysql`] - MySQL backend
//!
//! # Example
//!
//! ```
//! use shared::filter::{Attribute, FilterSpec};
//! use shared::models::{ExplainResult, ExplainRow};
//!
//! let spec = FilterSpec::new().exclude(Attribute::AccessType, ["ALL"]);
//! let full_scan = ExplainResult::new(
//!     "SELECT * FROM user",
//!     "app",
//!     vec![ExplainRow::new("SIMPLE", "user").with_access_type("ALL")],
//! );
//!
//! assert!(!spec.passes(&full_scan));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod dedupe;
pub mod explain;
pub mod filter;
pub mod format;
pub mod models;
pub mod mysql;
pub mod pipeline;
pub mod resolve;
pub mod source;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use validator;
