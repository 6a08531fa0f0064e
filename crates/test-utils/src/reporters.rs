#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Mutex;

use kiln::asset::{Asset, ErrorAsset};
use kiln::event::InputEvent;
use kiln::reporter::Reporter;

/// A reporter that records everything it observes, for assertions.
#[derive(Default)]
pub struct RecordingReporter {
    inputs: Mutex<Vec<(String, Vec<InputEvent>)>>,
    built: Mutex<Vec<PathBuf>>,
    deleted: Mutex<Vec<PathBuf>>,
    idle_failures: Mutex<Vec<Vec<PathBuf>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inputs(&self) -> Vec<(String, Vec<InputEvent>)> {
        self.inputs.lock().unwrap().clone()
    }

    /// Dist paths of committed artifacts, in commit order.
    pub fn built(&self) -> Vec<PathBuf> {
        self.built.lock().unwrap().clone()
    }

    pub fn built_count(&self) -> usize {
        self.built.lock().unwrap().len()
    }

    pub fn deleted(&self) -> Vec<PathBuf> {
        self.deleted.lock().unwrap().clone()
    }

    /// One element per idle notification: the failed source paths outstanding
    /// at that point.
    pub fn idle_failures(&self) -> Vec<Vec<PathBuf>> {
        self.idle_failures.lock().unwrap().clone()
    }

    pub fn idle_count(&self) -> usize {
        self.idle_failures.lock().unwrap().len()
    }

    pub fn reset(&self) {
        self.inputs.lock().unwrap().clear();
        self.built.lock().unwrap().clear();
        self.deleted.lock().unwrap().clear();
        self.idle_failures.lock().unwrap().clear();
    }
}

impl Reporter for RecordingReporter {
    fn on_input(&self, task: &str, events: &[InputEvent]) {
        self.inputs
            .lock()
            .unwrap()
            .push((task.to_string(), events.to_vec()));
    }

    fn on_built(&self, _task: &str, asset: &Asset) {
        if let Some(dist) = asset.dist_path() {
            self.built.lock().unwrap().push(dist.to_path_buf());
        }
    }

    fn on_deleted(&self, _task: &str, asset: &Asset) {
        if let Some(dist) = asset.dist_path() {
            self.deleted.lock().unwrap().push(dist.to_path_buf());
        }
    }

    fn on_idle(&self, failed: &[ErrorAsset]) {
        self.idle_failures
            .lock()
            .unwrap()
            .push(failed.iter().map(|f| f.source_path.clone()).collect());
    }
}
