// src/cache/artifact.rs

//! Artifact tracking store.
//!
//! Persists, per entry, a JSON map from entry-relative dist path to
//! [`CacheRecord`]. Records are upserted when artifacts commit and removed
//! when deletions commit; both are buffered in memory during a batch and
//! flushed as a whole-file replace at idle sync, under the store lock.
//!
//! [`ArtifactStore::verify`] is the staleness check at the start of a run: a
//! `Built` record whose output file (or recorded source map) is missing from
//! disk yields a targeted `Updated` for the record's source path, so the
//! pipeline re-derives exactly that output instead of rebuilding the entry.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::asset::map_path_for;
use crate::errors::Result;

use super::lock::FileLock;
use super::CacheContext;

const STORE: &str = "artifacts";

/// On-disk record for one tracked output path.
///
/// Absence of a record means "deleted or never built".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CacheRecord {
    Built {
        task: String,
        has_source_map: bool,
        source_path: PathBuf,
    },
    Failed {
        source_path: PathBuf,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ArtifactFile {
    records: BTreeMap<String, CacheRecord>,
}

#[derive(Debug, Default)]
struct PendingDelta {
    upserts: BTreeMap<String, CacheRecord>,
    removals: BTreeSet<String>,
}

pub struct ArtifactStore {
    ctx: CacheContext,
    pending: Mutex<HashMap<PathBuf, PendingDelta>>,
}

impl ArtifactStore {
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

    /// Whether any prior records exist for this entry. Absence means the run
    /// has no usable history and starts from `Initial`.
    pub fn has_records(&self, entry: &Path) -> Result<bool> {
        Ok(!load_records(&self.file_for(entry))?.records.is_empty())
    }

    /// Current on-disk records for an entry (committed state only; pending
    /// deltas are not applied).
    pub fn records(&self, entry: &Path) -> Result<BTreeMap<String, CacheRecord>> {
        Ok(load_records(&self.file_for(entry))?.records)
    }

    /// Check every record against the filesystem and return source paths
    /// that need re-deriving: `Built` outputs that went missing, plus any
    /// `Failed` records.
    pub fn verify(&self, entry: &Path) -> Result<Vec<PathBuf>> {
        let file = load_records(&self.file_for(entry))?;
        let mut stale = Vec::new();

        for (rel_dist, record) in &file.records {
            match record {
                CacheRecord::Built {
                    has_source_map,
                    source_path,
                    ..
                } => {
                    let dist = entry.join(rel_dist);
                    let missing = !dist.exists()
                        || (*has_source_map && !map_path_for(&dist).exists());
                    if missing {
                        debug!(
                            entry = ?entry,
                            dist = %rel_dist,
                            source = ?source_path,
                            "tracked artifact missing on disk; re-deriving"
                        );
                        stale.push(source_path.clone());
                    }
                }
                CacheRecord::Failed { source_path } => {
                    stale.push(source_path.clone());
                }
            }
        }

        Ok(stale)
    }

    /// Buffer an upsert for the entry's next flush.
    pub fn upsert(&self, entry: &Path, rel_dist: &Path, record: CacheRecord) {
        if let Ok(mut pending) = self.pending.lock() {
            let delta = pending.entry(entry.to_path_buf()).or_default();
            let key = rel_dist.to_string_lossy().into_owned();
            delta.removals.remove(&key);
            delta.upserts.insert(key, record);
        }
    }

    /// Buffer a removal for the entry's next flush.
    pub fn remove(&self, entry: &Path, rel_dist: &Path) {
        if let Ok(mut pending) = self.pending.lock() {
            let delta = pending.entry(entry.to_path_buf()).or_default();
            let key = rel_dist.to_string_lossy().into_owned();
            delta.upserts.remove(&key);
            delta.removals.insert(key);
        }
    }

    /// Apply buffered deltas to the on-disk file under the store lock.
    pub fn flush(&self, entry: &Path) -> Result<()> {
        let delta = self
            .pending
            .lock()
            .ok()
            .and_then(|mut p| p.remove(entry));

        let Some(delta) = delta else {
            return Ok(());
        };
        if delta.upserts.is_empty() && delta.removals.is_empty() {
            return Ok(());
        }

        let path = self.file_for(entry);
        let _lock = FileLock::acquire(&path, self.ctx.lock_options())?;

        let mut file = load_records(&path)?;
        for key in &delta.removals {
            file.records.remove(key);
        }
        for (key, record) in delta.upserts {
            file.records.insert(key, record);
        }

        save_records(&path, &file)?;
        info!(entry = ?entry, records = file.records.len(), "flushed artifact records");
        Ok(())
    }
}

fn load_records(path: &Path) -> Result<ArtifactFile> {
    if !path.exists() {
        return Ok(ArtifactFile::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading artifact store at {:?}", path))?;
    let file = serde_json::from_str(&contents)
        .with_context(|| format!("parsing artifact store at {:?}", path))?;
    Ok(file)
}

fn save_records(path: &Path, file: &ArtifactFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating cache directory at {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(file).context("serializing artifact store")?;
    fs::write(path, json).with_context(|| format!("writing artifact store at {:?}", path))?;
    Ok(())
}
