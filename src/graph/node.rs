// src/graph/node.rs

use std::path::PathBuf;

/// One entry in the dependency graph, built once from validated config.
///
/// During a run the graph is consumed destructively: completed nodes' names
/// are removed from remaining nodes' `dependencies`; a node with an empty
/// list is a leaf and may start.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub name: String,
    pub entry: PathBuf,
    /// Pipeline name resolved for this entry.
    pub pipeline: String,
    /// Names of nodes that must complete before this one starts.
    pub dependencies: Vec<String>,
}

impl DependencyNode {
    pub fn new(
        name: impl Into<String>,
        entry: impl Into<PathBuf>,
        pipeline: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            pipeline: pipeline.into(),
            dependencies,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.dependencies.is_empty()
    }
}
