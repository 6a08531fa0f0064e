// src/run/mod.rs

//! The build scheduler.
//!
//! - [`queue`] bounds how many batches execute concurrently.
//! - [`runner`] resolves input events from cache state, runs the pipeline,
//!   commits assets and synchronizes caches at idle.
//! - [`watch`] bridges the filesystem watcher into the runner and handles
//!   cooperative unsubscribe.

pub mod queue;
pub mod runner;
pub mod watch;

pub use queue::BatchQueue;
pub use runner::{BatchMode, Runner, RunnerOptions};
pub use watch::WatchSubscription;
