//! Run configuration.
//!
//! `RunOptions` is built once from external configuration before a run starts
//! and is passed down the pipeline explicitly.

pub mod options;

pub use options::{ConfigError, RunOptions, DEFAULT_MAPPING_FILE};
