// src/run/watch.rs

//! Filesystem watcher bridge.
//!
//! notify delivers events on its own thread; the callback forwards them over
//! an unbounded channel into an async loop that routes each path through the
//! runner's ignore filtering. Keeping the `RecommendedWatcher` inside the
//! subscription is what keeps watching alive; dropping it stops callbacks.

use anyhow::Error as AnyError;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::{KilnError, Result};

use super::queue::BatchQueue;
use super::runner::Runner;

/// A live watch subscription.
pub struct WatchSubscription {
    _watcher: RecommendedWatcher,
    forward: JoinHandle<()>,
    queue: BatchQueue,
}

impl std::fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSubscription").finish_non_exhaustive()
    }
}

impl WatchSubscription {
    /// Stop watching, then wait for in-flight batches to finish.
    ///
    /// Cooperative: no in-flight pipeline execution is interrupted, so a
    /// transform that never completes blocks unsubscribe indefinitely.
    pub async fn unsubscribe(self) -> Result<()> {
        // Dropping the watcher stops callbacks and closes the channel, which
        // ends the forwarding loop.
        drop(self._watcher);
        let _ = self.forward.await;
        self.queue.drain().await;
        info!("watch subscription closed");
        Ok(())
    }
}

/// Start watching all of the runner's entries recursively.
pub fn subscribe(runner: &Runner) -> Result<WatchSubscription> {
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    // Called synchronously by notify whenever an event arrives.
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = event_tx.send(event);
            }
            Err(err) => {
                tracing::warn!(error = %err, "file watch error");
            }
        },
        Config::default(),
    )
    .map_err(|e| KilnError::Other(AnyError::new(e)))?;

    for entry in runner.entries() {
        watcher
            .watch(entry, RecursiveMode::Recursive)
            .map_err(|e| KilnError::Other(AnyError::new(e)))?;
        info!(entry = ?entry, "file watcher started");
    }

    let loop_runner = runner.clone();
    let forward = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "received notify event");
            for path in event.paths {
                loop_runner.inject_change(&path);
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatchSubscription {
        _watcher: watcher,
        forward,
        queue: runner.queue_handle(),
    })
}
