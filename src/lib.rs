// src/lib.rs

pub mod asset;
pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod event;
pub mod graph;
pub mod logging;
pub mod pipeline;
pub mod reporter;
pub mod run;
pub mod walk;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::Glob;
use tracing::{debug, info};

use crate::cache::{CacheOptions, CacheStores, LockOptions};
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, EntryConfig};
use crate::errors::{KilnError, Result};
use crate::graph::{DependencyNode, GraphRunner};
use crate::pipeline::PipelineRegistry;
use crate::reporter::{BoxReporter, LogReporter};
use crate::run::{watch, Runner, RunnerOptions};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (file and/or CLI entries)
/// - cache stores
/// - one runner per dependency node
/// - the graph runner
/// - (optional) file watchers and Ctrl-C handling
pub async fn run(args: CliArgs, registry: &PipelineRegistry) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = if config_path.exists() {
        load_and_validate(&config_path)?
    } else {
        ConfigFile::for_entries(&[])
    };

    // CLI entries override the config file's entry set.
    if !args.entries.is_empty() {
        cfg.entry = expand_entries(&args.entries)?;
    }
    if cfg.entry.is_empty() {
        return Err(KilnError::ConfigError(format!(
            "no entries to build: pass entry paths or add [entry.*] sections to {:?}",
            config_path
        )));
    }

    if args.no_cache {
        cfg.build.cache = false;
    }
    if let Some(pipeline) = &args.pipeline {
        cfg.build.pipeline = pipeline.clone();
    }

    let root = config_root_dir(&config_path);
    let nodes = dependency_nodes(&cfg, &root);

    if args.dry_run {
        print_dry_run(&cfg, &nodes);
        return Ok(());
    }

    let cache_options = CacheOptions {
        root: root.join(&cfg.build.cache_dir),
        cache_key: cfg.build.cache_key.clone(),
        lock: LockOptions {
            timeout: std::time::Duration::from_millis(cfg.build.lock_timeout_ms),
            backoff: std::time::Duration::from_millis(cfg.build.lock_backoff_ms),
        },
    };
    let stores = Arc::new(CacheStores::new(&cache_options));
    let reporter: BoxReporter = Arc::new(LogReporter::new());
    let runner_options = RunnerOptions {
        cache: cfg.build.cache,
        max_concurrent_batches: cfg.build.max_concurrent_batches,
    };

    // One runner per node, resolved once at startup so pipeline lookup
    // failures surface before anything builds.
    let mut runners: BTreeMap<String, Arc<Runner>> = BTreeMap::new();
    for node in &nodes {
        let transform = registry.get(&node.pipeline)?;
        runners.insert(
            node.name.clone(),
            Arc::new(Runner::new(
                transform,
                vec![node.entry.clone()],
                Arc::clone(&stores),
                Arc::clone(&reporter),
                runner_options.clone(),
            )),
        );
    }

    let watch_mode = args.watch;
    let graph_runners = runners.clone();
    GraphRunner::new(nodes)
        .run(move |node| {
            let runner = graph_runners.get(&node.name).cloned();
            async move {
                match runner {
                    Some(r) if watch_mode => r.run_incremental().await,
                    Some(r) => r.build().await,
                    None => Err(KilnError::ConfigError(format!(
                        "no runner wired for entry '{}'",
                        node.name
                    ))),
                }
            }
        })
        .await?;

    if watch_mode {
        let mut subscriptions = Vec::new();
        for runner in runners.values() {
            subscriptions.push(watch::subscribe(runner)?);
        }
        info!("watching for changes; press Ctrl-C to stop");

        tokio::signal::ctrl_c().await?;
        info!("shutdown requested; draining in-flight batches");

        for sub in subscriptions {
            sub.unsubscribe().await?;
        }
    }

    Ok(())
}

/// Figure out the project root the config's entry paths are relative to.
///
/// - A config path with a non-empty parent (e.g. `configs/Kiln.toml`) uses
///   that directory.
/// - A bare filename like `Kiln.toml` falls back to the current working
///   directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn dependency_nodes(cfg: &ConfigFile, root: &Path) -> Vec<DependencyNode> {
    cfg.entry
        .iter()
        .map(|(name, entry)| {
            DependencyNode::new(
                name.clone(),
                root.join(&entry.path),
                entry
                    .pipeline
                    .clone()
                    .unwrap_or_else(|| cfg.build.pipeline.clone()),
                entry.depends_on.clone(),
            )
        })
        .collect()
}

/// Expand CLI entry patterns into concrete entry configs.
///
/// Plain existing directories pass through; anything else is treated as a
/// glob matched against directories under the current working directory.
fn expand_entries(patterns: &[String]) -> Result<BTreeMap<String, EntryConfig>> {
    let mut out = BTreeMap::new();

    for pattern in patterns {
        if Path::new(pattern).is_dir() {
            out.insert(pattern.clone(), bare_entry(pattern));
            continue;
        }

        let matcher = Glob::new(pattern)
            .map_err(|e| {
                KilnError::ConfigError(format!("invalid entry glob '{pattern}': {e}"))
            })?
            .compile_matcher();

        let mut matched = false;
        for dir in list_dirs(Path::new("."))? {
            let rel = dir.display().to_string();
            if matcher.is_match(&rel) {
                debug!(pattern = %pattern, dir = %rel, "entry glob match");
                out.insert(rel.clone(), bare_entry(&rel));
                matched = true;
            }
        }
        if !matched {
            return Err(KilnError::ConfigError(format!(
                "entry pattern '{pattern}' matched no directories"
            )));
        }
    }

    Ok(out)
}

fn bare_entry(path: &str) -> EntryConfig {
    EntryConfig {
        path: path.to_string(),
        depends_on: Vec::new(),
        pipeline: None,
    }
}

/// All directories under `root` (relative paths, hidden dirs skipped).
fn list_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    fn walk(root: &Path, rel: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in fs::read_dir(root.join(rel))? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let child = rel.join(&name);
            out.push(child.clone());
            walk(root, &child, out)?;
        }
        Ok(())
    }

    let mut out = Vec::new();
    walk(root, Path::new(""), &mut out)?;
    out.sort();
    Ok(out)
}

/// Simple dry-run output: print build settings and the entry graph.
fn print_dry_run(cfg: &ConfigFile, nodes: &[DependencyNode]) {
    println!("kiln dry-run");
    println!("  build.pipeline = {}", cfg.build.pipeline);
    println!("  build.cache = {}", cfg.build.cache);
    println!(
        "  build.max_concurrent_batches = {}",
        cfg.build.max_concurrent_batches
    );
    println!();

    println!("entries ({}):", nodes.len());
    for node in nodes {
        println!("  - {}", node.name);
        println!("      path: {}", node.entry.display());
        println!("      pipeline: {}", node.pipeline);
        if !node.dependencies.is_empty() {
            println!("      depends_on: {:?}", node.dependencies);
        }
    }

    debug!("dry-run complete (no execution)");
}
