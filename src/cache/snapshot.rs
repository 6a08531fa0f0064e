// src/cache/snapshot.rs

//! Filesystem snapshot store.
//!
//! Persists, per entry, one line per file: `<hash> <mtime_ms> <len> <path>`.
//! [`SnapshotStore::events_since`] diffs the current filesystem state against
//! the stored baseline and returns raw change events; the fresh scan is kept
//! in memory so [`SnapshotStore::write_snapshot`] can commit it as the new
//! baseline at idle sync without re-walking the entry.
//!
//! The diff uses an mtime+size fast path: file contents are only re-hashed
//! when the cheap metadata comparison fails, which is what makes warm starts
//! cheap on large entries.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use tracing::{debug, info};

use crate::errors::Result;
use crate::event::{ChangeKind, RawChange};
use crate::walk::walk_relative;

use super::lock::FileLock;
use super::CacheContext;

const STORE: &str = "snapshot";

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileState {
    hash: String,
    mtime_ms: u64,
    len: u64,
}

type EntrySnapshot = BTreeMap<PathBuf, FileState>;

pub struct SnapshotStore {
    ctx: CacheContext,
    /// Fresh scans from `events_since`, pending commit by `write_snapshot`.
    scanned: Mutex<HashMap<PathBuf, EntrySnapshot>>,
}

impl SnapshotStore {
    pub fn new(ctx: CacheContext) -> Self {
        Self {
            ctx,
            scanned: Mutex::new(HashMap::new()),
        }
    }

    fn file_for(&self, entry: &Path) -> PathBuf {
        self.ctx
            .store_file(STORE, &self.ctx.entry_hash(entry), "txt")
    }

    /// Diff the entry's current filesystem state against the last committed
    /// snapshot. Returns raw changes relative to the entry.
    pub fn events_since(&self, entry: &Path) -> Result<Vec<RawChange>> {
        let baseline = load_snapshot(&self.file_for(entry))?;
        let (current, changes) = scan_and_diff(entry, &baseline)?;

        debug!(
            entry = ?entry,
            files = current.len(),
            changes = changes.len(),
            "snapshot diff complete"
        );

        if let Ok(mut scanned) = self.scanned.lock() {
            scanned.insert(entry.to_path_buf(), current);
        }

        Ok(changes)
    }

    /// Commit the new baseline for `entry` under the store lock.
    ///
    /// Uses the scan stashed by [`events_since`] when available. Otherwise
    /// (an `Initial` run or a watch-mode idle sync that never diffed) it
    /// rescans against the last written snapshot, so unchanged files hit the
    /// mtime+size fast path instead of being re-hashed wholesale.
    pub fn write_snapshot(&self, entry: &Path) -> Result<()> {
        let stashed = self
            .scanned
            .lock()
            .ok()
            .and_then(|mut s| s.remove(entry));

        let path = self.file_for(entry);
        let snapshot = match stashed {
            Some(s) => s,
            None => {
                let baseline = load_snapshot(&path)?;
                scan_and_diff(entry, &baseline)?.0
            }
        };
        let _lock = FileLock::acquire(&path, self.ctx.lock_options())?;
        save_snapshot(&path, &snapshot)?;

        info!(entry = ?entry, files = snapshot.len(), "wrote filesystem snapshot");
        Ok(())
    }
}

/// Walk the entry, diff against `baseline`, and return the fresh snapshot
/// along with the detected changes.
fn scan_and_diff(
    entry: &Path,
    baseline: &EntrySnapshot,
) -> Result<(EntrySnapshot, Vec<RawChange>)> {
    let mut current = EntrySnapshot::new();
    let mut changes = Vec::new();

    for rel in walk_relative(entry).context("scanning entry for snapshot")? {
        let abs = entry.join(&rel);
        let meta = match fs::metadata(&abs) {
            Ok(m) => m,
            // Deleted between walk and stat; the removal shows up via the
            // baseline pass below.
            Err(_) => continue,
        };
        let len = meta.len();
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let state = match baseline.get(&rel) {
            // Fast path: identical metadata, trust the stored hash.
            Some(prev) if prev.mtime_ms == mtime_ms && prev.len == len => prev.clone(),
            Some(prev) => {
                let hash = hash_file(&abs)?;
                if hash != prev.hash {
                    changes.push(RawChange::new(ChangeKind::Modified, rel.clone()));
                }
                FileState { hash, mtime_ms, len }
            }
            None => {
                let hash = hash_file(&abs)?;
                changes.push(RawChange::new(ChangeKind::Created, rel.clone()));
                FileState { hash, mtime_ms, len }
            }
        };
        current.insert(rel, state);
    }

    for rel in baseline.keys() {
        if !current.contains_key(rel) {
            changes.push(RawChange::new(ChangeKind::Removed, rel.clone()));
        }
    }

    Ok((current, changes))
}

fn hash_file(path: &Path) -> Result<String> {
    let contents =
        fs::read(path).with_context(|| format!("reading file for hashing: {:?}", path))?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(&contents);
    let hex = hasher.finalize().to_hex().to_string();
    Ok(hex[..super::hash::SHORT_HASH_LEN].to_string())
}

fn load_snapshot(path: &Path) -> Result<EntrySnapshot> {
    if !path.exists() {
        return Ok(EntrySnapshot::new());
    }

    let contents =
        fs::read_to_string(path).with_context(|| format!("reading snapshot at {:?}", path))?;

    let mut snapshot = EntrySnapshot::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(4, ' ');
        let (Some(hash), Some(mtime), Some(len), Some(rel)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            // Corrupt line; treat the file as absent from the baseline so it
            // re-registers as Created.
            continue;
        };
        let (Ok(mtime_ms), Ok(len)) = (mtime.parse::<u64>(), len.parse::<u64>()) else {
            continue;
        };
        snapshot.insert(
            PathBuf::from(rel),
            FileState {
                hash: hash.to_string(),
                mtime_ms,
                len,
            },
        );
    }

    Ok(snapshot)
}

fn save_snapshot(path: &Path, snapshot: &EntrySnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating cache directory at {:?}", parent))?;
    }

    let file =
        File::create(path).with_context(|| format!("creating snapshot at {:?}", path))?;
    let mut writer = BufWriter::new(file);

    for (rel, state) in snapshot {
        writeln!(
            writer,
            "{} {} {} {}",
            state.hash,
            state.mtime_ms,
            state.len,
            rel.display()
        )
        .with_context(|| format!("writing snapshot at {:?}", path))?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing snapshot at {:?}", path))?;
    Ok(())
}
