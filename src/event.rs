// src/event.rs

//! Change notifications fed to a pipeline.
//!
//! An [`InputEvent`] is the unit of input for a build batch. Events are
//! produced from three sources:
//! - a full-rebuild signal (`Initial`) when no usable cache state exists,
//! - the filesystem snapshot diff at the start of a run,
//! - the live file watcher while in watch mode.

use std::path::{Path, PathBuf};

/// A single change notification for one entry.
///
/// `Initial` means "no reliable history; treat as a full rebuild". The other
/// variants carry a path *relative to the owning entry*.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputEvent {
    Initial { entry: PathBuf },
    Updated { entry: PathBuf, path: PathBuf },
    Deleted { entry: PathBuf, path: PathBuf },
}

impl InputEvent {
    /// The entry that owns this event. Every variant carries one.
    pub fn entry(&self) -> &Path {
        match self {
            InputEvent::Initial { entry } => entry,
            InputEvent::Updated { entry, .. } => entry,
            InputEvent::Deleted { entry, .. } => entry,
        }
    }

    /// Entry-relative path of the changed file, if any (`Initial` has none).
    pub fn path(&self) -> Option<&Path> {
        match self {
            InputEvent::Initial { .. } => None,
            InputEvent::Updated { path, .. } => Some(path),
            InputEvent::Deleted { path, .. } => Some(path),
        }
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, InputEvent::Initial { .. })
    }
}

/// Kind of a raw filesystem change, before conversion into an [`InputEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A raw change as produced by the snapshot diff or the watcher bridge.
///
/// `path` is relative to the owning entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl RawChange {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Convert into an [`InputEvent`] for the given entry.
    ///
    /// Created and Modified both map to `Updated`; the distinction does not
    /// matter to transforms, which re-derive output from current contents.
    pub fn into_event(self, entry: &Path) -> InputEvent {
        match self.kind {
            ChangeKind::Created | ChangeKind::Modified => InputEvent::Updated {
                entry: entry.to_path_buf(),
                path: self.path,
            },
            ChangeKind::Removed => InputEvent::Deleted {
                entry: entry.to_path_buf(),
                path: self.path,
            },
        }
    }
}
