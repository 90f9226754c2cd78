//! Small filesystem helpers shared across commands.

use std::path::Path;

use anyhow::{Context, Result};

use crate::domain::error::ConfigError;

/// Append `line` to the file unless an identical line is already present.
/// Returns true when the line was added. The file is created when missing.
pub fn append_line_if_missing(path: &Path, line: &str) -> Result<bool> {
    let line = line.trim();
    let existing = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    if existing.lines().any(|l| l.trim() == line) {
        return Ok(false);
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(line);
    updated.push('\n');
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, updated).with_context(|| format!("writing {}", path.display()))?;
    Ok(true)
}

/// Verify the workspace directory exists, is a directory, and is writable
/// (probed by creating and removing a temp file).
pub fn ensure_workspace_writable(path: &Path) -> Result<()> {
    let display = path.display().to_string();
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::WorkspaceMissing(display).into());
        }
        Err(e) => {
            return Err(ConfigError::WorkspaceNotWritable {
                path: display,
                reason: e.to_string(),
            }
            .into());
        }
    };
    if !meta.is_dir() {
        return Err(ConfigError::WorkspaceNotDir(display).into());
    }
    tempfile::Builder::new()
        .prefix(".devkit-workspace-check-")
        .tempfile_in(path)
        .map(drop)
        .map_err(|e| {
            ConfigError::WorkspaceNotWritable {
                path: display,
                reason: e.to_string(),
            }
            .into()
        })
}
