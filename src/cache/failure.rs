// src/cache/failure.rs

//! Failure tracking store.
//!
//! Persists, per entry, the set of source paths that produced an error asset
//! on the last run, tagged with the pipeline name that produced them. These
//! are re-emitted as `Updated` events on the next run regardless of
//! filesystem changes, so failed files are retried until they succeed or are
//! deleted.
//!
//! A record written under one pipeline name is invalidated when read under
//! another: a different pipeline would not have failed the same way.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::Result;

use super::lock::FileLock;
use super::CacheContext;

const STORE: &str = "failures";

#[derive(Debug, Default, Serialize, Deserialize)]
struct FailureFile {
    task: String,
    failed: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct PendingFailures {
    added: BTreeSet<String>,
    cleared: BTreeSet<String>,
}

pub struct FailureStore {
    ctx: CacheContext,
    pending: Mutex<HashMap<PathBuf, PendingFailures>>,
}

impl FailureStore {
    pub fn new(ctx: CacheContext) -> Self {
        Self {
            ctx,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn file_for(&self, entry: &Path) -> PathBuf {
        self.ctx
            .store_file(STORE, &self.ctx.namespace_hash(entry), "json")
    }

    /// Source paths that failed on the last run of `task` for this entry.
    ///
    /// Records written by a different task are ignored.
    pub fn failed_paths(&self, entry: &Path, task: &str) -> Result<Vec<PathBuf>> {
        let file = load_failures(&self.file_for(entry))?;
        if file.task != task {
            if !file.failed.is_empty() {
                debug!(
                    entry = ?entry,
                    recorded_task = %file.task,
                    lookup_task = %task,
                    "failure records belong to a different task; ignoring"
                );
            }
            return Ok(Vec::new());
        }
        Ok(file.failed.iter().map(PathBuf::from).collect())
    }

    /// Buffer a failed source path for the entry's next flush.
    pub fn record_failure(&self, entry: &Path, source_path: &Path) {
        if let Ok(mut pending) = self.pending.lock() {
            let delta = pending.entry(entry.to_path_buf()).or_default();
            let key = source_path.to_string_lossy().into_owned();
            delta.cleared.remove(&key);
            delta.added.insert(key);
        }
    }

    /// Buffer removal of a previously failed source path (the file committed
    /// successfully, or was deleted).
    pub fn clear(&self, entry: &Path, source_path: &Path) {
        if let Ok(mut pending) = self.pending.lock() {
            let delta = pending.entry(entry.to_path_buf()).or_default();
            let key = source_path.to_string_lossy().into_owned();
            delta.added.remove(&key);
            delta.cleared.insert(key);
        }
    }

    /// Apply buffered deltas under the store lock.
    ///
    /// If the on-disk records belong to a different task they are discarded
    /// wholesale before the delta is applied.
    pub fn flush(&self, entry: &Path, task: &str) -> Result<()> {
        let delta = self
            .pending
            .lock()
            .ok()
            .and_then(|mut p| p.remove(entry));

        let Some(delta) = delta else {
            return Ok(());
        };
        if delta.added.is_empty() && delta.cleared.is_empty() {
            return Ok(());
        }

        let path = self.file_for(entry);
        let _lock = FileLock::acquire(&path, self.ctx.lock_options())?;

        let mut file = load_failures(&path)?;
        if file.task != task {
            file = FailureFile {
                task: task.to_string(),
                failed: BTreeSet::new(),
            };
        }
        for key in &delta.cleared {
            file.failed.remove(key);
        }
        for key in delta.added {
            file.failed.insert(key);
        }

        save_failures(&path, &file)?;
        info!(entry = ?entry, task = %task, failed = file.failed.len(), "flushed failure records");
        Ok(())
    }
}

fn load_failures(path: &Path) -> Result<FailureFile> {
    if !path.exists() {
        return Ok(FailureFile::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading failure store at {:?}", path))?;
    let file = serde_json::from_str(&contents)
        .with_context(|| format!("parsing failure store at {:?}", path))?;
    Ok(file)
}

fn save_failures(path: &Path, file: &FailureFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating cache directory at {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(file).context("serializing failure store")?;
    fs::write(path, json).with_context(|| format!("writing failure store at {:?}", path))?;
    Ok(())
}
