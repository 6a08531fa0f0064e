// src/graph/runner.rs

//! Leaves-first graph execution.
//!
//! Repeatedly takes every current leaf, runs them concurrently, and on each
//! completion removes the finished name from the remaining nodes' dependency
//! lists. A node therefore never starts before all of its declared
//! dependencies have completed, while unrelated subtrees interleave freely.
//!
//! If no leaves exist while nodes remain and nothing is in flight, the
//! remaining nodes form at least one cycle; we walk an arbitrary node's
//! dependency chain until a name repeats and fail with that path.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::{KilnError, Result};

use super::node::DependencyNode;

pub struct GraphRunner {
    nodes: Vec<DependencyNode>,
}

impl GraphRunner {
    pub fn new(nodes: Vec<DependencyNode>) -> Self {
        Self { nodes }
    }

    /// Execute `build` for every node, respecting declared dependencies.
    ///
    /// On a node failure no new nodes are started; in-flight nodes are
    /// awaited (never interrupted) and the first failure is returned.
    pub async fn run<F, Fut>(self, build: F) -> Result<()>
    where
        F: Fn(DependencyNode) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        // BTreeMap for deterministic leaf scheduling order.
        let mut pending: BTreeMap<String, DependencyNode> = self
            .nodes
            .into_iter()
            .map(|n| (n.name.clone(), n))
            .collect();

        let mut in_flight: JoinSet<(String, Result<()>)> = JoinSet::new();
        let mut failure: Option<KilnError> = None;

        loop {
            if failure.is_none() {
                let leaves: Vec<String> = pending
                    .values()
                    .filter(|n| n.is_leaf())
                    .map(|n| n.name.clone())
                    .collect();

                if leaves.is_empty() && in_flight.is_empty() {
                    if pending.is_empty() {
                        info!("dependency graph complete");
                        return Ok(());
                    }
                    let cycle = find_cycle(&pending);
                    return Err(KilnError::DependencyCycle(format_cycle(&cycle)));
                }

                for name in leaves {
                    if let Some(node) = pending.remove(&name) {
                        debug!(node = %name, "starting graph node");
                        let fut = build(node);
                        in_flight.spawn(async move { (name, fut.await) });
                    }
                }
            } else if in_flight.is_empty() {
                // Drained after a failure; report it.
                return Err(failure.take().unwrap_or_else(|| {
                    KilnError::Other(anyhow::anyhow!("graph run failed"))
                }));
            }

            match in_flight.join_next().await {
                Some(Ok((name, Ok(())))) => {
                    debug!(node = %name, "graph node complete");
                    for node in pending.values_mut() {
                        node.dependencies.retain(|d| d != &name);
                    }
                }
                Some(Ok((name, Err(e)))) => {
                    warn!(node = %name, error = %e, "graph node failed; draining in-flight nodes");
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
                Some(Err(join_err)) => {
                    if failure.is_none() {
                        failure = Some(KilnError::Other(anyhow::anyhow!(
                            "graph node panicked: {join_err}"
                        )));
                    }
                }
                None => {
                    // Nothing in flight; loop re-evaluates leaves or exits.
                }
            }
        }
    }
}

/// Walk an arbitrary remaining node's dependency chain until a name repeats,
/// returning the names on the cycle in dependency order.
fn find_cycle(pending: &BTreeMap<String, DependencyNode>) -> Vec<String> {
    let Some(start) = pending.keys().next() else {
        return Vec::new();
    };

    let mut visited: HashMap<String, usize> = HashMap::new();
    let mut path: Vec<String> = Vec::new();
    let mut current = start.clone();

    loop {
        if let Some(&i) = visited.get(&current) {
            return path[i..].to_vec();
        }
        visited.insert(current.clone(), path.len());
        path.push(current.clone());

        // Completed dependencies have been removed, so any remaining dep
        // points at a pending node; if none remain this node was a leaf and
        // we would not be here.
        let next = pending
            .get(&current)
            .and_then(|n| n.dependencies.iter().find(|d| pending.contains_key(*d)))
            .cloned();

        match next {
            Some(n) => current = n,
            None => return path,
        }
    }
}

fn format_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => {
            let mut names: Vec<&str> = cycle.iter().map(|s| s.as_str()).collect();
            names.push(first);
            names.join(" -> ")
        }
        None => String::from("<empty>"),
    }
}
