// src/graph/mod.rs

//! Multi-entry dependency graph execution.
//!
//! - [`node`] holds the [`DependencyNode`] value type built from config.
//! - [`runner`] executes a build function across nodes, leaves first, with
//!   walk-based cycle reconstruction for diagnostics.

pub mod node;
pub mod runner;

pub use node::DependencyNode;
pub use runner::GraphRunner;
