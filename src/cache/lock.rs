// src/cache/lock.rs

//! Cross-process mutual exclusion via lock files.
//!
//! Each store file gets a `.lock` sibling created with `O_EXCL`; holding the
//! lock means having created the file. Contenders retry with a fixed backoff
//! until the configured timeout, then fail the operation with
//! [`KilnError::LockTimeout`]. The lock file is removed on drop.
//!
//! Lock scope is per store-file, so concurrent invocations touching
//! different entries never contend.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::errors::{KilnError, Result};

/// Wait policy for lock acquisition. Explicit configuration, not a hidden
/// default: `[build].lock_timeout_ms` / `lock_backoff_ms`.
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    pub timeout: Duration,
    pub backoff: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            backoff: Duration::from_millis(25),
        }
    }
}

/// An acquired exclusive lock; released on drop.
#[derive(Debug)]
pub struct FileLock {
    lock_path: PathBuf,
}

impl FileLock {
    /// Acquire the lock guarding `path` (i.e. create `<path>.lock`),
    /// blocking up to `options.timeout`.
    pub fn acquire(path: &Path, options: LockOptions) -> Result<Self> {
        let lock_path = lock_path_for(path);

        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let start = Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => {
                    debug!(lock = ?lock_path, "acquired cache lock");
                    return Ok(Self { lock_path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if start.elapsed() >= options.timeout {
                        warn!(lock = ?lock_path, "cache lock wait timed out");
                        return Err(KilnError::LockTimeout {
                            path: lock_path,
                            waited_ms: options.timeout.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(options.backoff);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Best effort; a leaked lock file is cleared by the next timeout-free
        // holder or manual cache removal.
        let _ = fs::remove_file(&self.lock_path);
    }
}

/// `<path>.lock` sibling of a store file.
fn lock_path_for(path: &Path) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}
