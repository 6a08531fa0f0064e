// src/pipeline/combinators.rs

//! Transform combinators: `series`, `parallel` and `dispatch`.
//!
//! All three fan the *same* input batch out to their stages; the batch is an
//! `Arc`, so fan-out is a pointer copy and every stage sees the full replay.
//!
//! - `series` runs stages one after another; all of stage N's output is
//!   emitted before stage N+1 starts.
//! - `parallel` runs stages concurrently; outputs interleave as produced.
//! - `dispatch` is `parallel` plus dedup by dist path: the first asset
//!   observed for a given output path wins, later duplicates are dropped.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::asset::Asset;
use crate::event::InputEvent;

use super::{BoxTransform, Transform, TransformFuture};

/// Run `stages` sequentially over the same input batch.
pub fn series(stages: Vec<BoxTransform>) -> BoxTransform {
    Arc::new(Series {
        name: combinator_name("series", &stages),
        stages,
    })
}

/// Run `stages` concurrently over the same input batch.
pub fn parallel(stages: Vec<BoxTransform>) -> BoxTransform {
    Arc::new(Parallel {
        name: combinator_name("parallel", &stages),
        stages,
    })
}

/// Run `stages` concurrently, keeping only the first asset emitted for each
/// dist path.
pub fn dispatch(stages: Vec<BoxTransform>) -> BoxTransform {
    Arc::new(Dispatch {
        name: combinator_name("dispatch", &stages),
        stages,
    })
}

fn combinator_name(kind: &str, stages: &[BoxTransform]) -> String {
    let inner: Vec<&str> = stages.iter().map(|s| s.name()).collect();
    format!("{}({})", kind, inner.join(", "))
}

struct Series {
    name: String,
    stages: Vec<BoxTransform>,
}

impl Transform for Series {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, events: Arc<[InputEvent]>, out: mpsc::Sender<Asset>) -> TransformFuture<'_> {
        Box::pin(async move {
            for stage in &self.stages {
                stage.run(events.clone(), out.clone()).await?;
            }
            Ok(())
        })
    }
}

struct Parallel {
    name: String,
    stages: Vec<BoxTransform>,
}

impl Transform for Parallel {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, events: Arc<[InputEvent]>, out: mpsc::Sender<Asset>) -> TransformFuture<'_> {
        Box::pin(async move { run_stages_concurrently(&self.stages, events, out).await })
    }
}

struct Dispatch {
    name: String,
    stages: Vec<BoxTransform>,
}

impl Transform for Dispatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, events: Arc<[InputEvent]>, out: mpsc::Sender<Asset>) -> TransformFuture<'_> {
        Box::pin(async move {
            // Stages emit into an inner channel; a forwarder drops any asset
            // whose dist path has already been seen in this batch.
            let (inner_tx, mut inner_rx) = mpsc::channel::<Asset>(64);

            let forwarder = tokio::spawn(async move {
                let mut seen: HashSet<PathBuf> = HashSet::new();
                while let Some(asset) = inner_rx.recv().await {
                    if let Some(dist) = asset.dist_path() {
                        if !seen.insert(dist.to_path_buf()) {
                            debug!(path = ?dist, "dispatch: dropping duplicate asset");
                            continue;
                        }
                    }
                    if out.send(asset).await.is_err() {
                        // Receiver gone; stop forwarding.
                        break;
                    }
                }
            });

            let result = run_stages_concurrently(&self.stages, events, inner_tx).await;

            forwarder
                .await
                .map_err(|e| anyhow!("dispatch forwarder panicked: {e}"))?;

            result
        })
    }
}

async fn run_stages_concurrently(
    stages: &[BoxTransform],
    events: Arc<[InputEvent]>,
    out: mpsc::Sender<Asset>,
) -> anyhow::Result<()> {
    let mut join = JoinSet::new();

    for stage in stages {
        let stage = Arc::clone(stage);
        let events = events.clone();
        let out = out.clone();
        join.spawn(async move { stage.run(events, out).await });
    }
    // Drop our copy of the sender so the channel closes once stages finish.
    drop(out);

    let mut first_error = None;
    while let Some(res) = join.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(anyhow!("pipeline stage panicked: {e}"));
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
