// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level configuration as read from `Kiln.toml`:
///
/// ```toml
/// [build]
/// pipeline = "default"
/// cache = true
/// max_concurrent_batches = 50
///
/// [entry.app]
/// path = "pkgs/app"
/// depends_on = ["lib"]
///
/// [entry.lib]
/// path = "pkgs/lib"
/// ```
///
/// All sections are optional and have defaults; entries may instead come
/// from CLI positionals.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub build: BuildSection,

    /// All entries from `[entry.<name>]`, keyed by entry name.
    #[serde(default)]
    pub entry: BTreeMap<String, EntryConfig>,
}

/// `[build]` section: global engine knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    /// Default pipeline name for entries that do not override it.
    #[serde(default = "default_pipeline")]
    pub pipeline: String,

    /// Whether the on-disk cache is used at all.
    #[serde(default = "default_cache")]
    pub cache: bool,

    /// Cache root directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// User cache-busting key mixed into cache namespaces.
    #[serde(default)]
    pub cache_key: String,

    /// Maximum concurrently executing batches.
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,

    /// How long a cache lock acquisition may wait before failing.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Sleep between lock acquisition attempts.
    #[serde(default = "default_lock_backoff_ms")]
    pub lock_backoff_ms: u64,
}

fn default_pipeline() -> String {
    "default".to_string()
}

fn default_cache() -> bool {
    true
}

fn default_cache_dir() -> String {
    ".kiln".to_string()
}

fn default_max_concurrent_batches() -> usize {
    50
}

fn default_lock_timeout_ms() -> u64 {
    1000
}

fn default_lock_backoff_ms() -> u64 {
    25
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            pipeline: default_pipeline(),
            cache: default_cache(),
            cache_dir: default_cache_dir(),
            cache_key: String::new(),
            max_concurrent_batches: default_max_concurrent_batches(),
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_backoff_ms: default_lock_backoff_ms(),
        }
    }
}

impl Default for RawConfigFile {
    fn default() -> Self {
        Self {
            build: BuildSection::default(),
            entry: BTreeMap::new(),
        }
    }
}

/// `[entry.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryConfig {
    /// Entry root directory, relative to the config file.
    pub path: String,

    /// Names of entries that must build before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Per-entry pipeline override; falls back to `build.pipeline`.
    #[serde(default)]
    pub pipeline: Option<String>,
}

/// Validated configuration. Construct via `TryFrom<RawConfigFile>` (see
/// `config::validate`) or [`ConfigFile::for_entries`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub build: BuildSection,
    pub entry: BTreeMap<String, EntryConfig>,
}

impl ConfigFile {
    /// Bypass validation; used by `TryFrom` after checks pass.
    pub(crate) fn new_unchecked(build: BuildSection, entry: BTreeMap<String, EntryConfig>) -> Self {
        Self { build, entry }
    }

    /// Synthesize a config for bare CLI entries (no config file): default
    /// build section, one independent entry per path, named after the path.
    pub fn for_entries(paths: &[String]) -> Self {
        let entry = paths
            .iter()
            .map(|p| {
                (
                    p.clone(),
                    EntryConfig {
                        path: p.clone(),
                        depends_on: Vec::new(),
                        pipeline: None,
                    },
                )
            })
            .collect();
        Self {
            build: BuildSection::default(),
            entry,
        }
    }
}
