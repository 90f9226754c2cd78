//! Container path computation.

use devkit_cli::domain::paths::{
    agent_env, agent_home_path, agent_repo_path, anchor_base, anchor_home, clean_window_path,
};

#[test]
fn repo_paths_per_overlay() {
    assert_eq!(agent_repo_path("dev-all", "1", "svc"), "/workspaces/dev/svc");
    assert_eq!(
        agent_repo_path("dev-all", "3", "svc"),
        "/workspaces/dev/agent-worktrees/agent3/svc"
    );
    assert_eq!(agent_repo_path("codex", "2", "svc"), "/workspace");
}

#[test]
fn home_paths_per_overlay() {
    assert_eq!(
        agent_home_path("dev-all", "1", "svc"),
        "/workspaces/dev/svc/.devhome-agent1"
    );
    assert_eq!(
        agent_home_path("dev-all", "1", ""),
        "/workspaces/dev/.devhomes/agent1"
    );
    assert_eq!(
        agent_home_path("dev-all", "2", "svc"),
        "/workspaces/dev/agent-worktrees/agent2/.devhome-agent2"
    );
    assert_eq!(agent_home_path("codex", "2", "svc"), "/workspace/.devhome-agent2");
}

#[test]
fn anchors_per_overlay() {
    assert_eq!(anchor_home("dev-all"), "/workspaces/dev/.devhome");
    assert_eq!(anchor_base("dev-all"), "/workspaces/dev/.devhomes");
    assert_eq!(anchor_home("codex"), "/workspace/.devhome");
    assert_eq!(anchor_base("anything-else"), "/workspace/.devhomes");
}

#[test]
fn agent_env_derives_from_home() {
    let env = agent_env("codex", "2", "");
    assert_eq!(env["HOME"], "/workspace/.devhome-agent2");
    assert_eq!(env["CODEX_HOME"], "/workspace/.devhome-agent2/.codex");
    assert_eq!(
        env["CODEX_ROLLOUT_DIR"],
        "/workspace/.devhome-agent2/.codex/rollouts"
    );
    assert_eq!(env["XDG_CACHE_HOME"], "/workspace/.devhome-agent2/.cache");
    assert_eq!(env["XDG_CONFIG_HOME"], "/workspace/.devhome-agent2/.config");
}

#[test]
fn window_paths_resolve_relative_to_overlay_base() {
    assert_eq!(clean_window_path("dev-all", "svc/api"), "/workspaces/dev/svc/api");
    assert_eq!(clean_window_path("codex", "api"), "/workspace/api");
    assert_eq!(clean_window_path("codex", "/opt/tools"), "/opt/tools");
    assert_eq!(clean_window_path("codex", ""), "/workspace");
}
