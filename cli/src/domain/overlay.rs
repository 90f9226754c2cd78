//! Overlay and host configuration schemas.
//!
//! Overlays live in `overlays/<project>/devkit.yaml`; the host config in
//! `~/.config/devkit/config.yaml` (or `$DEVKIT_CONFIG`). Reading is done by
//! `infra::overlay_store`; this module holds the serde types and path
//! resolution rules.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Per-overlay configuration (`devkit.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Host directory bound into the container as the workspace.
    pub workspace: String,
    pub env: HashMap<String, String>,
    pub env_files: Vec<String>,
    pub hooks: Hooks,
    pub defaults: Defaults,
    /// Default service name for this overlay's agents.
    pub service: String,
    pub ingress: Option<IngressConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Hooks {
    pub warm: String,
    pub maintain: String,
}

/// Fallbacks used by reset/bootstrap/worktree flows.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub agents: i64,
    pub repo: String,
    pub base_branch: String,
    pub branch_prefix: String,
    /// Comma-separated compose profiles.
    pub profiles: String,
}

/// Optional HTTPS reverse proxy attached to an overlay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    pub kind: String,
    /// Path to a user-provided proxy config; generated from routes when empty.
    pub config: String,
    pub routes: Vec<IngressRoute>,
    pub certs: Vec<IngressCert>,
    pub hosts: Vec<String>,
    pub env: HashMap<String, String>,
}

/// A single host → service:port mapping for generated proxy configs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngressRoute {
    pub host: String,
    pub service: String,
    pub port: u16,
    pub cert: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngressCert {
    pub path: String,
}

/// Host-level configuration (`~/.config/devkit/config.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub overlay_paths: Vec<String>,
    pub env: HashMap<String, String>,
    pub cli: HostCliConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostCliConfig {
    pub download_url: String,
}

/// Absolute workspace path for an overlay, or `None` when unset.
///
/// Relative paths resolve against the overlay directory, falling back to the
/// kit root when the overlay has no directory of its own.
#[must_use]
pub fn resolve_workspace(
    cfg: &OverlayConfig,
    overlay_dir: Option<&Path>,
    root: &Path,
) -> Option<PathBuf> {
    let ws = cfg.workspace.trim();
    if ws.is_empty() {
        return None;
    }
    let path = Path::new(ws);
    if path.is_absolute() {
        return Some(path.to_path_buf());
    }
    let base = overlay_dir.unwrap_or(root);
    Some(normalize(&base.join(path)))
}

/// Lexically normalize `.` and `..` segments without touching the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}
