// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Three stages, kept separate:
//! - [`model`]: serde types mirroring the TOML file.
//! - [`loader`]: reading + deserialisation.
//! - [`validate`]: semantic checks (`TryFrom<RawConfigFile>`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{BuildSection, ConfigFile, EntryConfig, RawConfigFile};
