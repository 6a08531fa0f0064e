// src/pipeline/registry.rs

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{KilnError, Result};

use super::{BoxTransform, CopyTransform};

/// Maps pipeline names (from config / `--pipeline`) to transforms.
///
/// Library users register their own transforms here; the binary registers
/// only the built-in `default` copy pipeline. Resolution happens once at
/// startup, so an unknown name is a fatal configuration error.
#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: HashMap<String, BoxTransform>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry containing only the built-in copy pipeline under `default`.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register("default", Arc::new(CopyTransform::new("default")));
        reg
    }

    pub fn register(&mut self, name: impl Into<String>, transform: BoxTransform) {
        self.pipelines.insert(name.into(), transform);
    }

    pub fn get(&self, name: &str) -> Result<BoxTransform> {
        self.pipelines
            .get(name)
            .cloned()
            .ok_or_else(|| KilnError::PipelineNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(|s| s.as_str())
    }
}
