//! Layout file model and static validation.
//!
//! A layout declares the overlays to bring up and the tmux windows to
//! materialize. Parsing is plain serde; validation reports warnings (layout
//! probably works but looks off) separately from errors (apply would fail).

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::paths::DEFAULT_SERVICE;

/// Top-level layout document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LayoutFile {
    pub session: String,
    pub overlays: Vec<OverlayRun>,
    pub windows: Vec<Window>,
}

/// One overlay to bring up.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OverlayRun {
    pub project: String,
    pub service: String,
    pub count: i64,
    pub profiles: String,
    pub build: bool,
    pub compose_project: String,
    pub network: Option<NetworkOverride>,
    pub worktrees: Option<WorktreeRequest>,
    pub env: HashMap<String, String>,
}

/// Forces the internal subnet and DNS IP for an overlay's networks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkOverride {
    pub subnet: String,
    pub dns_ip: String,
}

/// Host-side git worktree preparation for the multi-repo overlay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorktreeRequest {
    /// Primary repo folder name under the dev root.
    pub repo: String,
    /// Number of agents/worktrees. Falls back to the overlay count when 0.
    pub count: i64,
    pub base_branch: String,
    pub branch_prefix: String,
}

/// One tmux window, anchored to the Nth container of a project/service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Window {
    pub index: i64,
    pub project: String,
    pub service: String,
    pub path: String,
    pub name: String,
}

fn window_label(w: &Window) -> String {
    let name = w.name.trim();
    if name.is_empty() {
        format!("index {}", w.index)
    } else {
        format!("{} (index {})", name, w.index)
    }
}

/// Inspect a layout and report potential issues.
///
/// Returns `(warnings, errors)`, both sorted for stable output.
#[must_use]
pub fn validate(f: &LayoutFile, default_project: &str) -> (Vec<String>, Vec<String>) {
    let default_project = default_project.trim();
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    let mut overlay_counts: HashMap<String, i64> = HashMap::new();
    for ov in &f.overlays {
        let proj = if ov.project.trim().is_empty() {
            default_project
        } else {
            ov.project.trim()
        };
        if proj.is_empty() {
            continue;
        }
        overlay_counts.insert(proj.to_string(), ov.count.max(1));
    }

    let mut max_index: HashMap<String, i64> = HashMap::new();
    let mut windows_by_ref: HashMap<(String, String, i64), Vec<String>> = HashMap::new();
    let mut missing_overlay: Vec<String> = Vec::new();

    for w in &f.windows {
        if w.index < 1 {
            errors.push(format!(
                "window {} uses invalid index {}",
                window_label(w),
                w.index
            ));
            continue;
        }
        let proj = if w.project.trim().is_empty() {
            default_project
        } else {
            w.project.trim()
        };
        if proj.is_empty() {
            errors.push(format!(
                "window {} is missing a project and no default project was provided",
                window_label(w)
            ));
            continue;
        }
        let svc = if w.service.trim().is_empty() {
            DEFAULT_SERVICE
        } else {
            w.service.trim()
        };
        windows_by_ref
            .entry((proj.to_string(), svc.to_string(), w.index))
            .or_default()
            .push(window_label(w));
        let entry = max_index.entry(proj.to_string()).or_insert(0);
        *entry = (*entry).max(w.index);
        if !overlay_counts.contains_key(proj) && !missing_overlay.contains(&proj.to_string()) {
            missing_overlay.push(proj.to_string());
        }
    }

    for proj in missing_overlay {
        warnings.push(format!(
            "no overlay defined for project {proj}; assuming default compose files"
        ));
    }

    for (proj, max_idx) in &max_index {
        if let Some(count) = overlay_counts.get(proj) {
            if max_idx > count {
                errors.push(format!(
                    "project {proj} requires container index {max_idx} but overlay count is {count}"
                ));
            }
        }
    }

    for ((proj, svc, idx), mut labels) in windows_by_ref {
        if labels.len() <= 1 {
            continue;
        }
        labels.sort();
        warnings.push(format!(
            "multiple windows target {proj}/{svc} index {idx} ({})",
            labels.join(", ")
        ));
    }

    warnings.sort();
    errors.sort();
    (warnings, errors)
}
