//! # Error Types
//!
//! Everything that can fail happens before the first frame: reading the
//! configuration and starting the worker threads. Stepping never fails.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading or validating a [`crate::SimulationConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field has an unusable value.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidField {
        /// Field name as written in the file.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Errors from constructing a [`crate::Simulation`].
#[derive(Error, Debug)]
pub enum SimulationError {
    /// Configuration rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A worker thread could not be spawned.
    #[error("failed to start thread pool: {0}")]
    ThreadPool(#[from] std::io::Error),
}

/// Result type for simulation setup.
pub type Result<T> = std::result::Result<T, SimulationError>;
