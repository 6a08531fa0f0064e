// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KilnError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("Timed out acquiring cache lock {path:?} after {waited_ms}ms")]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    #[error("Build failed for {path:?}: {message}")]
    BuildFailed { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, KilnError>;
