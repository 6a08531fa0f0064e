// src/asset.rs

//! Build outputs and their commit semantics.
//!
//! An [`Asset`] is the unit of output of a transform. It is a plain sum type
//! so the commit state machine can be matched exhaustively:
//!
//! - `File` with status `Artifact` is persisted to its dist path on commit
//!   (plus a `.map` companion when a source map is attached).
//! - `File` with status `Source` is an unwritten intermediate value.
//! - `Deleted` removes the artifact (and its map) from disk; removal failures
//!   are swallowed since deletion is idempotent.
//! - `Error` carries a recoverable per-file failure; commit is a no-op.
//!
//! All variants are immutable and keep the originating [`InputEvent`] for
//! entry/path lookup only.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::event::InputEvent;

/// Whether a file asset is an intermediate value or a persisted output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Source,
    Artifact,
}

/// A produced (or intermediate) output file.
#[derive(Debug, Clone)]
pub struct FileAsset {
    pub status: FileStatus,
    /// Entry-relative output path; stages may rewrite it (e.g. extension
    /// changes) but the owning entry never changes across derivations.
    pub path: PathBuf,
    /// Absolute target path: `entry.join(path)`.
    pub dist_path: PathBuf,
    /// Entry-relative path of the source file this output was derived from.
    pub source_path: PathBuf,
    pub contents: Vec<u8>,
    pub source_map: Option<Vec<u8>>,
    pub event: InputEvent,
}

impl FileAsset {
    /// Build an artifact asset for `event`, derived from `source_path` and
    /// written to `path` under the event's entry.
    pub fn artifact(
        event: &InputEvent,
        source_path: impl Into<PathBuf>,
        path: impl Into<PathBuf>,
        contents: Vec<u8>,
    ) -> Self {
        let path = path.into();
        let dist_path = event.entry().join(&path);
        Self {
            status: FileStatus::Artifact,
            path,
            dist_path,
            source_path: source_path.into(),
            contents,
            source_map: None,
            event: event.clone(),
        }
    }

    /// Same as [`FileAsset::artifact`] but with `Source` status (intermediate
    /// value handed to a later stage, never written to disk).
    pub fn source(
        event: &InputEvent,
        source_path: impl Into<PathBuf>,
        path: impl Into<PathBuf>,
        contents: Vec<u8>,
    ) -> Self {
        let mut asset = Self::artifact(event, source_path, path, contents);
        asset.status = FileStatus::Source;
        asset
    }

    pub fn with_source_map(mut self, map: Vec<u8>) -> Self {
        self.source_map = Some(map);
        self
    }
}

/// An output file that should no longer exist.
#[derive(Debug, Clone)]
pub struct DeletedAsset {
    pub path: PathBuf,
    pub dist_path: PathBuf,
    pub event: InputEvent,
}

impl DeletedAsset {
    pub fn new(event: &InputEvent, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let dist_path = event.entry().join(&path);
        Self {
            path,
            dist_path,
            event: event.clone(),
        }
    }
}

/// A recoverable per-file failure.
#[derive(Debug, Clone)]
pub struct ErrorAsset {
    /// Entry-relative path of the file that failed to transform.
    pub source_path: PathBuf,
    pub error: String,
    pub event: InputEvent,
}

impl ErrorAsset {
    pub fn new(event: &InputEvent, source_path: impl Into<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            error: error.into(),
            event: event.clone(),
        }
    }
}

/// The unit of output of a transform.
#[derive(Debug, Clone)]
pub enum Asset {
    File(FileAsset),
    Deleted(DeletedAsset),
    Error(ErrorAsset),
}

impl Asset {
    /// Absolute dist path for variants that have one.
    pub fn dist_path(&self) -> Option<&Path> {
        match self {
            Asset::File(f) => Some(&f.dist_path),
            Asset::Deleted(d) => Some(&d.dist_path),
            Asset::Error(_) => None,
        }
    }

    /// The originating event.
    pub fn event(&self) -> &InputEvent {
        match self {
            Asset::File(f) => &f.event,
            Asset::Deleted(d) => &d.event,
            Asset::Error(e) => &e.event,
        }
    }

    /// Apply this asset's side effect to disk.
    ///
    /// Artifacts are written whole (parent directories created as needed),
    /// deletions are idempotent, sources and errors are no-ops.
    pub fn commit(&self) -> Result<()> {
        match self {
            Asset::File(f) => match f.status {
                FileStatus::Source => Ok(()),
                FileStatus::Artifact => {
                    if let Some(parent) = f.dist_path.parent() {
                        fs::create_dir_all(parent).with_context(|| {
                            format!("creating output directory at {:?}", parent)
                        })?;
                    }
                    fs::write(&f.dist_path, &f.contents)
                        .with_context(|| format!("writing artifact at {:?}", f.dist_path))?;
                    if let Some(map) = &f.source_map {
                        let map_path = map_path_for(&f.dist_path);
                        fs::write(&map_path, map).with_context(|| {
                            format!("writing source map at {:?}", map_path)
                        })?;
                    }
                    debug!(path = ?f.dist_path, "committed artifact");
                    Ok(())
                }
            },
            Asset::Deleted(d) => {
                // Removal failures are swallowed: the artifact may already be
                // gone, which is the desired end state.
                let _ = fs::remove_file(&d.dist_path);
                let _ = fs::remove_file(map_path_for(&d.dist_path));
                debug!(path = ?d.dist_path, "removed artifact");
                Ok(())
            }
            Asset::Error(_) => Ok(()),
        }
    }
}

/// Path of the source-map companion for a dist path (`<dist>.map`).
pub fn map_path_for(dist_path: &Path) -> PathBuf {
    let mut os: OsString = dist_path.as_os_str().to_os_string();
    os.push(".map");
    PathBuf::from(os)
}
