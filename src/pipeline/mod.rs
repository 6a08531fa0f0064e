// src/pipeline/mod.rs

//! Pipeline composition.
//!
//! A [`Transform`] is the user-supplied unit of work: it receives one batch
//! of input events and emits assets into a channel as they are produced.
//! Watch mode feeds successive batches indefinitely, so a transform must not
//! assume a single call sees the whole history of a file.
//!
//! - [`combinators`] provides `series` / `parallel` / `dispatch` to compose
//!   transforms over a shared input batch.
//! - [`copy`] is the built-in passthrough pipeline used as the CLI default.
//! - [`registry`] maps pipeline names to transforms for config/CLI lookup.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::asset::Asset;
use crate::event::InputEvent;

pub mod combinators;
pub mod copy;
pub mod registry;

pub use combinators::{dispatch, parallel, series};
pub use copy::CopyTransform;
pub use registry::PipelineRegistry;

/// Boxed future returned by [`Transform::run`], borrowing the transform.
pub type TransformFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// A user-supplied transform from input events to assets.
///
/// The input batch is shared (`Arc`) so combinators can replay it to several
/// stages without re-reading anything upstream. Assets are sent into `out` as
/// they are produced; the receiver commits them in emission order.
///
/// Per-file failures must be reported as [`Asset::Error`] rather than by
/// returning `Err`: a returned error aborts the whole batch.
pub trait Transform: Send + Sync {
    /// Name used for cache namespacing, failure tracking and reporting.
    fn name(&self) -> &str;

    /// Process one batch of events, emitting assets into `out`.
    fn run(&self, events: Arc<[InputEvent]>, out: mpsc::Sender<Asset>) -> TransformFuture<'_>;
}

/// Shared handle to a transform, cloneable across batches and combinators.
pub type BoxTransform = Arc<dyn Transform>;
