// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file and return the raw, unvalidated form.
///
/// Only performs TOML deserialisation; use [`load_and_validate`] for the
/// semantic checks (unknown dependencies etc.).
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file and run validation.
///
/// This is the entry point for the rest of the application: reads TOML,
/// applies defaults (serde + `Default` impls), then checks entry dependency
/// references and global sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw)?;
    Ok(config)
}

/// Default config path: `Kiln.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Kiln.toml")
}
