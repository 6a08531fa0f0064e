// src/walk.rs

//! Recursive directory listing shared by the snapshot store and the built-in
//! copy pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Collect all regular files under `root`, as paths relative to `root`.
///
/// Hidden files and directories (name starting with `.`) are skipped, which
/// keeps cache directories, VCS metadata and editor droppings out of the
/// change-detection universe. Results are sorted for stable iteration order.
pub fn walk_relative(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk_into(root, Path::new(""), &mut out)?;
    out.sort();
    Ok(out)
}

fn walk_into(root: &Path, rel: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let dir = root.join(rel);
    let entries =
        fs::read_dir(&dir).with_context(|| format!("reading directory {:?}", dir))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("reading entry in {:?}", dir))?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }

        let child_rel = rel.join(&name);
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat on {:?}", entry.path()))?;

        if file_type.is_dir() {
            walk_into(root, &child_rel, out)?;
        } else if file_type.is_file() {
            out.push(child_rel);
        }
    }

    Ok(())
}
