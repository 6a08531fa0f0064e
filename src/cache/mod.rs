// src/cache/mod.rs

//! Multi-tier on-disk cache.
//!
//! Four concerns share this module, three of them backed by files under
//! `<cache_root>/cache/`:
//!
//! - [`snapshot`]: filesystem snapshots per entry, diffed on startup to
//!   produce change events without re-hashing everything.
//! - [`artifact`]: per-entry records of committed outputs, verified against
//!   disk at the start of a run.
//! - [`failure`]: per entry+pipeline set of source files that failed last
//!   run, retried until they succeed or are deleted.
//! - [`hash`]: the memoized short-hash service that names all other cache
//!   files, isolating cache-breaking inputs (tool version, cache key) from
//!   pure file-identity hashes.
//!
//! Every read-modify-write of a store file happens under an exclusive lock
//! file ([`lock`]), so independent CLI invocations can share a cache root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod artifact;
pub mod failure;
pub mod hash;
pub mod lock;
pub mod snapshot;

pub use artifact::{ArtifactStore, CacheRecord};
pub use failure::FailureStore;
pub use hash::HashService;
pub use lock::{FileLock, LockOptions};
pub use snapshot::SnapshotStore;

/// Options governing the on-disk cache.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Cache root directory (e.g. `.kiln`).
    pub root: PathBuf,
    /// User-supplied cache-busting key, mixed into store namespaces.
    pub cache_key: String,
    pub lock: LockOptions,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".kiln"),
            cache_key: String::new(),
            lock: LockOptions::default(),
        }
    }
}

/// Shared state handed to every store: file naming and locking policy.
#[derive(Debug, Clone)]
pub struct CacheContext {
    root: PathBuf,
    cache_key: String,
    lock: LockOptions,
    hashes: Arc<HashService>,
}

impl CacheContext {
    pub fn new(options: &CacheOptions) -> Self {
        Self {
            root: options.root.clone(),
            cache_key: options.cache_key.clone(),
            lock: options.lock,
            hashes: Arc::new(HashService::new()),
        }
    }

    /// Path of a store file: `<root>/cache/<store>.<hash>.<ext>`.
    pub fn store_file(&self, store: &str, hash: &str, ext: &str) -> PathBuf {
        self.root.join("cache").join(format!("{store}.{hash}.{ext}"))
    }

    /// Namespace hash for stores whose contents depend on the pipeline
    /// identity and tool version (artifact and failure records).
    pub fn namespace_hash(&self, entry: &Path) -> String {
        self.hashes.namespace_hash(entry, &self.cache_key)
    }

    /// Pure file-identity hash for stores that only track filesystem state
    /// (snapshots).
    pub fn entry_hash(&self, entry: &Path) -> String {
        self.hashes.entry_hash(entry)
    }

    pub fn lock_options(&self) -> LockOptions {
        self.lock
    }
}

/// The snapshot, artifact and failure stores bundled for the runner. The
/// hash service lives inside the shared [`CacheContext`].
pub struct CacheStores {
    pub snapshots: SnapshotStore,
    pub artifacts: ArtifactStore,
    pub failures: FailureStore,
}

impl CacheStores {
    pub fn new(options: &CacheOptions) -> Self {
        let ctx = CacheContext::new(options);
        Self {
            snapshots: SnapshotStore::new(ctx.clone()),
            artifacts: ArtifactStore::new(ctx.clone()),
            failures: FailureStore::new(ctx),
        }
    }
}
