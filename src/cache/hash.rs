// src/cache/hash.rs

//! Short-hash service naming all cache files.
//!
//! Hashes are deterministic blake3 digests truncated to 10 hex chars. The
//! service memoizes results since the same entry is hashed on every store
//! access within a run; the function itself performs no IO.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use blake3::Hasher;

/// Length of a short hash in hex characters.
pub const SHORT_HASH_LEN: usize = 10;

#[derive(Debug, Default)]
pub struct HashService {
    memo: Mutex<HashMap<String, String>>,
}

impl HashService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure file-identity hash of an entry path. Used for snapshot naming,
    /// which must survive version/cache-key changes.
    pub fn entry_hash(&self, entry: &Path) -> String {
        self.memoized(&[&entry.to_string_lossy()])
    }

    /// Namespace hash mixing entry, crate version and the user cache key.
    /// A version bump or cache-key change isolates a fresh namespace.
    pub fn namespace_hash(&self, entry: &Path, cache_key: &str) -> String {
        self.memoized(&[
            &entry.to_string_lossy(),
            env!("CARGO_PKG_VERSION"),
            cache_key,
        ])
    }

    fn memoized(&self, parts: &[&str]) -> String {
        let key = parts.join("\u{0}");
        if let Ok(memo) = self.memo.lock() {
            if let Some(hash) = memo.get(&key) {
                return hash.clone();
            }
        }

        let hash = short_hash(parts);

        if let Ok(mut memo) = self.memo.lock() {
            memo.insert(key, hash.clone());
        }
        hash
    }
}

/// Deterministic short hash over the given parts.
pub fn short_hash(parts: &[&str]) -> String {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        // Separator so ("ab","c") and ("a","bc") never collide.
        hasher.update(&[0]);
    }
    let hex = hasher.finalize().to_hex().to_string();
    hex[..SHORT_HASH_LEN].to_string()
}
