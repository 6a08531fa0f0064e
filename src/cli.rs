// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `kiln`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "kiln",
    version,
    about = "Incremental build engine: rebuild only what changed.",
    long_about = None
)]
pub struct CliArgs {
    /// Entry directories or globs to build.
    ///
    /// When given, these override the `[entry.*]` sections of the config
    /// file and build as independent entries.
    #[arg(value_name = "ENTRY")]
    pub entries: Vec<String>,

    /// Path to the config file (TOML).
    ///
    /// Default: `Kiln.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Kiln.toml")]
    pub config: String,

    /// Keep watching for changes after the initial build.
    #[arg(long)]
    pub watch: bool,

    /// Disable the on-disk cache (forces a full rebuild, persists nothing).
    #[arg(long)]
    pub no_cache: bool,

    /// Name of the pipeline to run (overrides the config file).
    #[arg(long, value_name = "NAME")]
    pub pipeline: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `KILN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve entries and print the dependency order without building.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
