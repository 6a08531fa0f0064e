#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary entry directory with helpers for arranging source files and
/// inspecting build outputs.
pub struct EntryFixture {
    dir: TempDir,
}

impl EntryFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp entry dir"),
        }
    }

    /// Canonicalized entry root. Runners canonicalize their entries, so
    /// fixtures hand out canonical paths to keep assertions comparable.
    pub fn root(&self) -> PathBuf {
        self.dir
            .path()
            .canonicalize()
            .expect("Failed to canonicalize temp dir")
    }

    /// Absolute path of an entry-relative file.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// Absolute path of an output under `dist/`.
    pub fn dist_path(&self, rel: &str) -> PathBuf {
        self.root().join("dist").join(rel)
    }

    /// Write a source file (creating parent directories).
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&path, contents).expect("Failed to write fixture file");
        path
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.path(rel)).expect("Failed to remove fixture file");
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).expect("Failed to read fixture file")
    }

    /// All file paths under `dist/`, relative to it, sorted.
    pub fn dist_files(&self) -> Vec<PathBuf> {
        let dist = self.root().join("dist");
        let mut out = Vec::new();
        collect_files(&dist, &dist, &mut out);
        out.sort();
        out
    }
}

impl Default for EntryFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_path_buf());
        }
    }
}
