//! Canonical container paths for agent workspaces and homes.
//!
//! Two mount layouts exist: the default single-workspace overlay binds one
//! repo at `/workspace`; the multi-repo overlay (`dev-all`) binds the whole
//! dev root at `/workspaces/dev` with per-agent worktrees underneath.

use std::collections::HashMap;

/// Subdirectory under the dev root holding secondary agent worktrees
/// (agent2, agent3, ...). Agent 1 always uses the primary checkout.
pub const AGENT_WORKTREES_DIR: &str = "agent-worktrees";

/// Service name agents run under unless an overlay declares otherwise.
pub const DEFAULT_SERVICE: &str = "dev-agent";

/// The multi-repo overlay project name.
pub const MULTI_REPO_PROJECT: &str = "dev-all";

fn is_multi_repo(project: &str) -> bool {
    project.trim() == MULTI_REPO_PROJECT
}

/// Anchor symlink path exposed to tooling inside a container.
#[must_use]
pub fn anchor_home(project: &str) -> &'static str {
    if is_multi_repo(project) {
        "/workspaces/dev/.devhome"
    } else {
        "/workspace/.devhome"
    }
}

/// Directory holding the per-container home directories the anchor points at.
#[must_use]
pub fn anchor_base(project: &str) -> &'static str {
    if is_multi_repo(project) {
        "/workspaces/dev/.devhomes"
    } else {
        "/workspace/.devhomes"
    }
}

/// Working directory inside the container for a given overlay, agent index,
/// and repo name.
///
/// - multi-repo: `/workspaces/dev/<repo>` for agent 1,
///   `/workspaces/dev/agent-worktrees/agent<N>/<repo>` for agent N ≥ 2
/// - single workspace: `/workspace`
#[must_use]
pub fn agent_repo_path(project: &str, idx: &str, repo: &str) -> String {
    if is_multi_repo(project) {
        let base = "/workspaces/dev";
        if idx.trim() == "1" {
            return format!("{base}/{repo}");
        }
        return format!("{base}/{AGENT_WORKTREES_DIR}/agent{}/{repo}", idx.trim());
    }
    "/workspace".to_string()
}

/// Per-agent HOME inside the container, used by index-addressed commands
/// that predate the anchor symlink (repo-push, verify, tmux-shells).
#[must_use]
pub fn agent_home_path(project: &str, idx: &str, repo: &str) -> String {
    let idx = idx.trim();
    if is_multi_repo(project) {
        let base = "/workspaces/dev";
        let suffix = format!(".devhome-agent{idx}");
        if idx == "1" {
            let repo = repo.trim();
            if !repo.is_empty() {
                return format!("{base}/{repo}/{suffix}");
            }
            return format!("{base}/.devhomes/agent{idx}");
        }
        return format!("{base}/{AGENT_WORKTREES_DIR}/agent{idx}/{suffix}");
    }
    format!("/workspace/.devhome-agent{idx}")
}

/// HOME plus the XDG/Codex variables derived from it.
#[must_use]
pub fn agent_env(project: &str, idx: &str, repo: &str) -> HashMap<String, String> {
    let home = agent_home_path(project, idx, repo);
    HashMap::from([
        ("HOME".to_string(), home.clone()),
        ("CODEX_HOME".to_string(), format!("{home}/.codex")),
        (
            "CODEX_ROLLOUT_DIR".to_string(),
            format!("{home}/.codex/rollouts"),
        ),
        ("XDG_CACHE_HOME".to_string(), format!("{home}/.cache")),
        ("XDG_CONFIG_HOME".to_string(), format!("{home}/.config")),
    ])
}

/// Normalize a layout window subpath into a container path.
///
/// Absolute paths pass through; relative paths resolve under the overlay's
/// workspace base.
#[must_use]
pub fn clean_window_path(project: &str, subpath: &str) -> String {
    if subpath.starts_with('/') {
        return subpath.to_string();
    }
    let base = if is_multi_repo(project) {
        "/workspaces/dev"
    } else {
        "/workspace"
    };
    if subpath.is_empty() {
        return base.to_string();
    }
    format!("{base}/{subpath}")
}
