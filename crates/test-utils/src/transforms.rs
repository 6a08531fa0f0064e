#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use kiln::asset::{Asset, DeletedAsset, ErrorAsset, FileAsset};
use kiln::event::InputEvent;
use kiln::pipeline::{Transform, TransformFuture};
use kiln::walk::walk_relative;

/// A fake compiler: `.ts` sources become uppercased `.js` artifacts under
/// `dist/`, each with a source map. Files whose contents contain `boom`
/// produce an `Asset::Error` instead, so tests can exercise failure
/// recording and retry.
pub struct CompileTransform {
    name: String,
}

impl CompileTransform {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    fn is_source(path: &Path) -> bool {
        !path.starts_with("dist") && path.extension().is_some_and(|e| e == "ts")
    }

    fn output_path(source: &Path) -> PathBuf {
        Path::new("dist").join(source.with_extension("js"))
    }

    fn compile_one(event: &InputEvent, source: &Path) -> Asset {
        let abs = event.entry().join(source);
        match fs::read_to_string(&abs) {
            Ok(contents) if contents.contains("boom") => Asset::Error(ErrorAsset::new(
                event,
                source,
                format!("compile failed for {:?}", source),
            )),
            Ok(contents) => Asset::File(
                FileAsset::artifact(
                    event,
                    source,
                    Self::output_path(source),
                    contents.to_uppercase().into_bytes(),
                )
                .with_source_map(format!("map:{}", source.display()).into_bytes()),
            ),
            Err(e) => Asset::Error(ErrorAsset::new(
                event,
                source,
                format!("reading {:?}: {e}", abs),
            )),
        }
    }
}

impl Transform for CompileTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, events: Arc<[InputEvent]>, out: mpsc::Sender<Asset>) -> TransformFuture<'_> {
        Box::pin(async move {
            for event in events.iter() {
                let assets: Vec<Asset> = match event {
                    InputEvent::Initial { entry } => walk_relative(entry)?
                        .iter()
                        .filter(|p| Self::is_source(p))
                        .map(|p| Self::compile_one(event, p))
                        .collect(),
                    InputEvent::Updated { path, .. } => {
                        if Self::is_source(path) {
                            vec![Self::compile_one(event, path)]
                        } else {
                            Vec::new()
                        }
                    }
                    InputEvent::Deleted { path, .. } => {
                        if Self::is_source(path) {
                            vec![Asset::Deleted(DeletedAsset::new(
                                event,
                                Self::output_path(path),
                            ))]
                        } else {
                            Vec::new()
                        }
                    }
                };

                for asset in assets {
                    if out.send(asset).await.is_err() {
                        return Ok(());
                    }
                }
            }
            Ok(())
        })
    }
}

/// Emits a fixed set of artifacts for every event it sees, regardless of the
/// filesystem. Useful for combinator tests where the interesting part is
/// which assets reach the output channel, not how they were derived.
pub struct EmitTransform {
    name: String,
    outputs: Vec<(PathBuf, Vec<u8>)>,
}

impl EmitTransform {
    pub fn new(name: &str, outputs: Vec<(&str, &str)>) -> Self {
        Self {
            name: name.to_string(),
            outputs: outputs
                .into_iter()
                .map(|(p, c)| (PathBuf::from(p), c.as_bytes().to_vec()))
                .collect(),
        }
    }
}

impl Transform for EmitTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, events: Arc<[InputEvent]>, out: mpsc::Sender<Asset>) -> TransformFuture<'_> {
        Box::pin(async move {
            for event in events.iter() {
                for (path, contents) in &self.outputs {
                    let asset = Asset::File(FileAsset::artifact(
                        event,
                        path.clone(),
                        path.clone(),
                        contents.clone(),
                    ));
                    if out.send(asset).await.is_err() {
                        return Ok(());
                    }
                }
            }
            Ok(())
        })
    }
}

/// Fails every batch outright, simulating an unrecoverable pipeline fault
/// (as opposed to the per-file errors `CompileTransform` produces).
pub struct BrokenTransform {
    name: String,
}

impl BrokenTransform {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Transform for BrokenTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, _events: Arc<[InputEvent]>, out: mpsc::Sender<Asset>) -> TransformFuture<'_> {
        Box::pin(async move {
            drop(out);
            Err(anyhow::anyhow!("pipeline fault in {}", self.name))
        })
    }
}

/// Records every batch it is invoked with (by transform name) and emits
/// nothing. Lets tests assert stage ordering and event multicast.
pub struct TapTransform {
    name: String,
    calls: Arc<Mutex<Vec<(String, Vec<InputEvent>)>>>,
}

impl TapTransform {
    pub fn new(name: &str, calls: Arc<Mutex<Vec<(String, Vec<InputEvent>)>>>) -> Self {
        Self {
            name: name.to_string(),
            calls,
        }
    }
}

impl Transform for TapTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, events: Arc<[InputEvent]>, out: mpsc::Sender<Asset>) -> TransformFuture<'_> {
        Box::pin(async move {
            {
                let mut guard = self.calls.lock().unwrap();
                guard.push((self.name.clone(), events.to_vec()));
            }
            drop(out);
            Ok(())
        })
    }
}
