// src/run/queue.rs

//! Bounded-concurrency batch queue.
//!
//! Batches are spawned as tokio tasks gated by a semaphore, so at most
//! `max_concurrent` run at once while the rest wait in FIFO permit order.
//! An idle watch channel lets the runner await queue drain for cache
//! synchronization and cooperative unsubscribe.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tracing::debug;

#[derive(Clone)]
pub struct BatchQueue {
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    idle_tx: watch::Sender<bool>,
    idle_rx: watch::Receiver<bool>,
}

impl BatchQueue {
    pub fn new(max_concurrent: usize) -> Self {
        let (idle_tx, idle_rx) = watch::channel(true);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle_tx,
            idle_rx,
        }
    }

    /// Number of batches enqueued but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Enqueue one batch. The future runs once a permit is available.
    pub fn enqueue<F>(&self, batch: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(batch, None);
    }

    /// Enqueue one batch with a drain hook.
    ///
    /// The hook runs if this batch's completion empties the queue, whether or
    /// not the batch itself succeeded. The decrement and the drain check are
    /// a single atomic operation, so among concurrently finishing batches
    /// exactly one observes the drain and runs its hook.
    pub fn enqueue_with_drain_hook<F, H>(&self, batch: F, on_drained: H)
    where
        F: Future<Output = ()> + Send + 'static,
        H: FnOnce() + Send + 'static,
    {
        self.spawn(batch, Some(Box::new(on_drained)));
    }

    fn spawn<F>(&self, batch: F, on_drained: Option<Box<dyn FnOnce() + Send>>)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _ = self.idle_tx.send(false);

        let permits = Arc::clone(&self.permits);
        let in_flight = Arc::clone(&self.in_flight);
        let idle_tx = self.idle_tx.clone();

        tokio::spawn(async move {
            // The semaphore is never closed while the queue exists.
            let permit = permits.acquire_owned().await.ok();
            if permit.is_some() {
                batch.await;
            }

            if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                debug!("batch queue drained");
                if let Some(hook) = on_drained {
                    hook();
                }
                let _ = idle_tx.send(true);
            }
        });
    }

    /// Wait until no batches are in flight.
    pub async fn drain(&self) {
        let mut rx = self.idle_rx.clone();
        loop {
            if *rx.borrow() && self.in_flight() == 0 {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for BatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchQueue")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn drain_returns_immediately_when_empty() {
        let queue = BatchQueue::new(4);
        queue.drain().await;
    }

    #[tokio::test]
    async fn drain_waits_for_enqueued_batches() {
        let queue = BatchQueue::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            queue.enqueue(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        queue.drain().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn drain_hook_fires_exactly_once_for_the_last_batch() {
        let queue = BatchQueue::new(4);
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let fired = Arc::clone(&fired);
            queue.enqueue_with_drain_hook(
                async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                },
                move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                },
            );
        }

        queue.drain().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let queue = BatchQueue::new(1);
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            queue.enqueue(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            });
        }

        queue.drain().await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
