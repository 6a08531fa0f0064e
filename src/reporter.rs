// src/reporter.rs

//! Build activity observation.
//!
//! The runner and cache subsystem report through this trait instead of
//! coupling to a specific UI. Production uses [`LogReporter`]; tests swap in
//! a recording implementation the same way the executor backend is swapped
//! elsewhere in the crate.

use std::sync::Arc;

use tracing::{info, warn};

use crate::asset::{Asset, ErrorAsset};
use crate::event::InputEvent;

pub trait Reporter: Send + Sync {
    /// A batch of input events is about to run through `task`.
    fn on_input(&self, _task: &str, _events: &[InputEvent]) {}

    /// An artifact was committed.
    fn on_built(&self, _task: &str, _asset: &Asset) {}

    /// A tracked output was removed.
    fn on_deleted(&self, _task: &str, _asset: &Asset) {}

    /// The queue drained and caches were synchronized; `failed` holds the
    /// error assets still outstanding for this run.
    fn on_idle(&self, _failed: &[ErrorAsset]) {}
}

pub type BoxReporter = Arc<dyn Reporter>;

/// Default production reporter: structured log lines.
#[derive(Debug, Default)]
pub struct LogReporter;

impl LogReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for LogReporter {
    fn on_input(&self, task: &str, events: &[InputEvent]) {
        info!(task = %task, events = events.len(), "batch input resolved");
    }

    fn on_built(&self, task: &str, asset: &Asset) {
        if let Some(dist) = asset.dist_path() {
            info!(task = %task, path = ?dist, "built");
        }
    }

    fn on_deleted(&self, task: &str, asset: &Asset) {
        if let Some(dist) = asset.dist_path() {
            info!(task = %task, path = ?dist, "deleted");
        }
    }

    fn on_idle(&self, failed: &[ErrorAsset]) {
        if failed.is_empty() {
            info!("idle");
        } else {
            for f in failed {
                warn!(path = ?f.source_path, error = %f.error, "file failed to build");
            }
            warn!(failed = failed.len(), "idle with failures; will retry on next change");
        }
    }
}

/// Reporter that ignores everything.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {}
