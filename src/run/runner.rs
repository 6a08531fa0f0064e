// src/run/runner.rs

//! The request runner: one pipeline over a set of entries.
//!
//! A run is a state machine per (pipeline, entry):
//!
//! 1. resolve input events (cache diff, artifact verification, failure
//!    retries; or a single `Initial` when there is no usable history),
//! 2. enqueue the events as one batch on the bounded queue,
//! 3. stream the pipeline's assets, committing and classifying each,
//! 4. at queue drain, flush all cache stores and notify the reporter.
//!
//! `build()` is the strict entrypoint: error assets fail the run after the
//! batch drains. Watch-mode batches are lenient: errors are recorded for
//! retry and the batch completes normally.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::asset::{Asset, ErrorAsset, FileStatus};
use crate::cache::{CacheRecord, CacheStores};
use crate::errors::{KilnError, Result};
use crate::event::InputEvent;
use crate::pipeline::BoxTransform;
use crate::reporter::BoxReporter;

use super::queue::BatchQueue;
use super::watch::{self, WatchSubscription};

/// Error policy for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Error assets fail the run once the batch drains (initial build).
    Strict,
    /// Error assets are recorded for retry (watch-mode incremental).
    Lenient,
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// When false, every run starts from `Initial` and nothing is persisted.
    pub cache: bool,
    /// Maximum concurrently executing batches.
    pub max_concurrent_batches: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            cache: true,
            max_concurrent_batches: 50,
        }
    }
}

/// Runs one pipeline over a set of entries.
///
/// Cheap to clone; clones share the queue, ignore set and cache stores.
#[derive(Clone)]
pub struct Runner {
    transform: BoxTransform,
    entries: Vec<PathBuf>,
    stores: Arc<CacheStores>,
    reporter: BoxReporter,
    queue: BatchQueue,
    /// Paths the engine itself just wrote, excluded from re-triggering.
    ignore: Arc<Mutex<HashSet<PathBuf>>>,
    /// Outstanding per-file failures, keyed by source path.
    failed: Arc<Mutex<BTreeMap<PathBuf, ErrorAsset>>>,
    options: RunnerOptions,
}

impl Runner {
    pub fn new(
        transform: BoxTransform,
        entries: Vec<PathBuf>,
        stores: Arc<CacheStores>,
        reporter: BoxReporter,
        options: RunnerOptions,
    ) -> Self {
        // Canonical entry paths keep cache namespaces and watcher paths
        // stable regardless of how the entry was spelled on the CLI.
        let entries = entries
            .into_iter()
            .map(|e| e.canonicalize().unwrap_or(e))
            .collect();

        let queue = BatchQueue::new(options.max_concurrent_batches);
        Self {
            transform,
            entries,
            stores,
            reporter,
            queue,
            ignore: Arc::new(Mutex::new(HashSet::new())),
            failed: Arc::new(Mutex::new(BTreeMap::new())),
            options,
        }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub(crate) fn queue_handle(&self) -> BatchQueue {
        self.queue.clone()
    }

    /// Initial build. Any error asset fails the run after its batch drains;
    /// cache state is only synchronized on full success, so a failed initial
    /// build is retried from scratch.
    pub async fn build(&self) -> Result<()> {
        self.run_pass(BatchMode::Strict).await
    }

    /// One incremental pass with watch-mode error policy: per-file failures
    /// are recorded for retry and do not fail the run.
    pub async fn run_incremental(&self) -> Result<()> {
        self.run_pass(BatchMode::Lenient).await
    }

    /// Incremental pass, then subscribe to filesystem changes.
    pub async fn watch(&self) -> Result<WatchSubscription> {
        self.run_incremental().await?;
        watch::subscribe(self)
    }

    async fn run_pass(&self, mode: BatchMode) -> Result<()> {
        let mut pending = Vec::new();

        for entry in &self.entries {
            let events = self.resolve_events(entry)?;
            self.reporter.on_input(self.transform.name(), &events);

            let (tx, rx) = oneshot::channel();
            let runner = self.clone();
            let entry = entry.clone();
            self.queue.enqueue(async move {
                let res = runner.run_batch(&entry, events, mode).await;
                let _ = tx.send(res);
            });
            pending.push(rx);
        }

        let mut first_err = None;
        for rx in pending {
            match rx.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(_) => {
                    if first_err.is_none() {
                        first_err =
                            Some(KilnError::Other(anyhow!("batch result channel dropped")));
                    }
                }
            }
        }
        self.queue.drain().await;

        if let Some(e) = first_err {
            // Skip cache sync: the next run must not trust this state.
            return Err(e);
        }

        self.sync_caches()?;
        self.notify_idle();
        Ok(())
    }

    /// Step 1 of the state machine: decide what the pipeline gets to see.
    fn resolve_events(&self, entry: &Path) -> Result<Vec<InputEvent>> {
        if !self.options.cache || !self.stores.artifacts.has_records(entry)? {
            debug!(entry = ?entry, "no usable history; full rebuild");
            return Ok(vec![InputEvent::Initial {
                entry: entry.to_path_buf(),
            }]);
        }

        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut events = Vec::new();

        for change in self.stores.snapshots.events_since(entry)? {
            if seen.insert(change.path.clone()) {
                events.push(change.into_event(entry));
            }
        }

        // Tracked artifacts that vanished from disk: re-derive from source.
        for source in self.stores.artifacts.verify(entry)? {
            if seen.insert(source.clone()) {
                events.push(InputEvent::Updated {
                    entry: entry.to_path_buf(),
                    path: source,
                });
            }
        }

        // Files that failed last run are retried regardless of fs changes.
        for source in self
            .stores
            .failures
            .failed_paths(entry, self.transform.name())?
        {
            if seen.insert(source.clone()) {
                events.push(InputEvent::Updated {
                    entry: entry.to_path_buf(),
                    path: source,
                });
            }
        }

        Ok(events)
    }

    /// Run one batch: subscribe the pipeline to the events and commit every
    /// asset in emission order. The pipeline always drains fully; strict
    /// mode elevates recorded per-file failures to a fatal error afterwards.
    async fn run_batch(
        &self,
        entry: &Path,
        events: Vec<InputEvent>,
        mode: BatchMode,
    ) -> Result<()> {
        let events: Arc<[InputEvent]> = events.into();
        let (tx, mut rx) = mpsc::channel::<Asset>(64);

        let transform = Arc::clone(&self.transform);
        let pipeline_events = events.clone();
        let pipeline =
            tokio::spawn(async move { transform.run(pipeline_events, tx).await });

        let mut batch_failures: Vec<ErrorAsset> = Vec::new();
        while let Some(asset) = rx.recv().await {
            self.commit_asset(entry, asset, &mut batch_failures)?;
        }

        match pipeline.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(KilnError::Other(e)),
            Err(e) => {
                return Err(KilnError::Other(anyhow!("pipeline task panicked: {e}")))
            }
        }

        if mode == BatchMode::Strict {
            if let Some(first) = batch_failures.first() {
                return Err(KilnError::BuildFailed {
                    path: first.source_path.clone(),
                    message: first.error.clone(),
                });
            }
        }
        Ok(())
    }

    fn commit_asset(
        &self,
        entry: &Path,
        asset: Asset,
        batch_failures: &mut Vec<ErrorAsset>,
    ) -> Result<()> {
        asset.commit()?;
        let task = self.transform.name();

        match &asset {
            Asset::File(f) if f.status == FileStatus::Artifact => {
                self.stores.artifacts.upsert(
                    entry,
                    &f.path,
                    CacheRecord::Built {
                        task: task.to_string(),
                        has_source_map: f.source_map.is_some(),
                        source_path: f.source_path.clone(),
                    },
                );
                // Success clears any failure state left for this source.
                self.stores.artifacts.remove(entry, &f.source_path);
                self.stores.failures.clear(entry, &f.source_path);
                self.clear_failed(&f.source_path);
                self.mark_ignored(&f.dist_path, f.source_map.is_some());
                self.reporter.on_built(task, &asset);
            }
            Asset::File(_) => {
                // Intermediate source value: no side effects, no tracking.
            }
            Asset::Deleted(d) => {
                self.stores.artifacts.remove(entry, &d.path);
                if let Some(src) = d.event.path() {
                    self.stores.artifacts.remove(entry, src);
                    self.stores.failures.clear(entry, src);
                    self.clear_failed(src);
                }
                self.mark_ignored(&d.dist_path, true);
                self.reporter.on_deleted(task, &asset);
            }
            Asset::Error(e) => {
                self.stores.failures.record_failure(entry, &e.source_path);
                self.stores.artifacts.upsert(
                    entry,
                    &e.source_path,
                    CacheRecord::Failed {
                        source_path: e.source_path.clone(),
                    },
                );
                if let Ok(mut failed) = self.failed.lock() {
                    failed.insert(e.source_path.clone(), e.clone());
                }
                batch_failures.push(e.clone());
            }
        }
        Ok(())
    }

    /// Flush all store deltas to disk. This is the durability point: a crash
    /// before it may force a future full rebuild but never corrupts state,
    /// since every store write is a whole-file replace.
    pub(crate) fn sync_caches(&self) -> Result<()> {
        if !self.options.cache {
            return Ok(());
        }
        for entry in &self.entries {
            self.stores.artifacts.flush(entry)?;
            self.stores.failures.flush(entry, self.transform.name())?;
            self.stores.snapshots.write_snapshot(entry)?;
        }
        Ok(())
    }

    pub(crate) fn notify_idle(&self) {
        let failed: Vec<ErrorAsset> = self
            .failed
            .lock()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        self.reporter.on_idle(&failed);
    }

    /// Route one absolute changed path through watch-mode filtering.
    ///
    /// Paths the engine itself just wrote (the ignore set), paths outside
    /// every entry, and hidden paths are discarded; anything surviving is
    /// enqueued as a one-event incremental batch. Returns `true` when a
    /// batch was enqueued.
    pub fn inject_change(&self, abs_path: &Path) -> bool {
        if self.is_ignored(abs_path) {
            debug!(path = ?abs_path, "self-written path; suppressing rebuild");
            return false;
        }

        let Some((entry, rel)) = self.owning_entry(abs_path) else {
            return false;
        };
        if rel
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
        {
            return false;
        }

        let event = if abs_path.exists() {
            InputEvent::Updated {
                entry: entry.clone(),
                path: rel,
            }
        } else {
            InputEvent::Deleted {
                entry: entry.clone(),
                path: rel,
            }
        };

        self.reporter
            .on_input(self.transform.name(), std::slice::from_ref(&event));

        let runner = self.clone();
        let drain_runner = self.clone();
        // The queue runs the hook for whichever batch empties it, so the
        // idle sync happens exactly once per drain and also after a failed
        // batch (sibling batches' deltas must still be flushed).
        self.queue.enqueue_with_drain_hook(
            async move {
                if let Err(e) = runner
                    .run_batch(&entry, vec![event], BatchMode::Lenient)
                    .await
                {
                    warn!(error = %e, "watch batch failed");
                }
            },
            move || {
                if let Err(e) = drain_runner.sync_caches() {
                    warn!(error = %e, "idle cache sync failed");
                }
                drain_runner.notify_idle();
            },
        );
        true
    }

    fn is_ignored(&self, abs_path: &Path) -> bool {
        self.ignore
            .lock()
            .map(|set| set.contains(abs_path))
            .unwrap_or(false)
    }

    fn owning_entry(&self, abs_path: &Path) -> Option<(PathBuf, PathBuf)> {
        self.entries
            .iter()
            .filter(|e| abs_path.starts_with(e))
            .max_by_key(|e| e.components().count())
            .and_then(|e| {
                abs_path
                    .strip_prefix(e)
                    .ok()
                    .map(|rel| (e.clone(), rel.to_path_buf()))
            })
    }

    fn mark_ignored(&self, dist_path: &Path, with_map: bool) {
        if let Ok(mut set) = self.ignore.lock() {
            set.insert(dist_path.to_path_buf());
            if with_map {
                set.insert(crate::asset::map_path_for(dist_path));
            }
        }
    }

    fn clear_failed(&self, source_path: &Path) {
        if let Ok(mut failed) = self.failed.lock() {
            failed.remove(source_path);
        }
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("task", &self.transform.name())
            .field("entries", &self.entries)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
