// src/pipeline/copy.rs

//! Built-in passthrough pipeline.
//!
//! Copies every source file of an entry to `dist/<path>` unchanged. This is
//! the default pipeline for the CLI when the user has not registered a
//! custom one; it also documents the contract a transform implementation is
//! expected to follow:
//!
//! - `Initial` fans out into one asset per discovered source file,
//! - `Updated` re-derives the single output for the changed file,
//! - `Deleted` emits a deletion for the corresponding output,
//! - per-file read failures become `Asset::Error`, never a returned `Err`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::asset::{Asset, DeletedAsset, ErrorAsset, FileAsset};
use crate::event::InputEvent;
use crate::walk::walk_relative;

use super::{Transform, TransformFuture};

/// Directory under the entry that holds copied outputs.
const DIST_DIR: &str = "dist";

pub struct CopyTransform {
    name: String,
}

impl CopyTransform {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Skip paths that are themselves outputs, so a copied artifact never
    /// becomes a source on the next batch.
    fn is_output(path: &Path) -> bool {
        path.starts_with(DIST_DIR)
    }

    fn output_path(source: &Path) -> PathBuf {
        Path::new(DIST_DIR).join(source)
    }

    fn copy_one(event: &InputEvent, source: &Path) -> Asset {
        let abs = event.entry().join(source);
        match fs::read(&abs) {
            Ok(contents) => Asset::File(FileAsset::artifact(
                event,
                source,
                Self::output_path(source),
                contents,
            )),
            Err(e) => Asset::Error(ErrorAsset::new(
                event,
                source,
                format!("reading {:?}: {e}", abs),
            )),
        }
    }
}

impl Transform for CopyTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, events: Arc<[InputEvent]>, out: mpsc::Sender<Asset>) -> TransformFuture<'_> {
        Box::pin(async move {
            for event in events.iter() {
                let assets: Vec<Asset> = match event {
                    InputEvent::Initial { entry } => {
                        let files = walk_relative(entry)?;
                        debug!(entry = ?entry, count = files.len(), "copy: full scan");
                        files
                            .iter()
                            .filter(|p| !Self::is_output(p))
                            .map(|p| Self::copy_one(event, p))
                            .collect()
                    }
                    InputEvent::Updated { path, .. } => {
                        if Self::is_output(path) {
                            Vec::new()
                        } else {
                            vec![Self::copy_one(event, path)]
                        }
                    }
                    InputEvent::Deleted { path, .. } => {
                        if Self::is_output(path) {
                            Vec::new()
                        } else {
                            vec![Asset::Deleted(DeletedAsset::new(
                                event,
                                Self::output_path(path),
                            ))]
                        }
                    }
                };

                for asset in assets {
                    if out.send(asset).await.is_err() {
                        // Receiver dropped; nothing left to do for this batch.
                        return Ok(());
                    }
                }
            }
            Ok(())
        })
    }
}
