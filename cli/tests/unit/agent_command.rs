//! Agent window command construction.

#![allow(clippy::expect_used)]

use devkit_cli::domain::identity::GitIdentity;
use devkit_cli::seed::agent::{build_command, CommandOpts, SeedTracker};

fn identity() -> GitIdentity {
    GitIdentity {
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
    }
}

fn opts() -> CommandOpts {
    CommandOpts {
        files: vec!["-f".to_string(), "/kit/compose.yml".to_string()],
        project: "zed".to_string(),
        index: "2".to_string(),
        dest: "/workspace".to_string(),
        service: "dev-agent".to_string(),
        compose_project: "devkit-zed".to_string(),
        container_name: String::new(),
        git_identity: Some(identity()),
        seed_codex: true,
    }
}

#[test]
fn missing_identity_is_fatal() {
    let mut o = opts();
    o.git_identity = None;
    let err = build_command(&o).expect_err("must fail without identity");
    assert!(err.to_string().contains("git identity not configured"));
}

#[test]
fn direct_command_has_one_exec_bash_and_exports_home() {
    let mut o = opts();
    o.container_name = "devkit-zed-dev-agent-2".to_string();
    let cmd = build_command(&o).expect("builds");
    assert_eq!(cmd.matches("exec bash").count(), 1);
    assert!(cmd.contains("export HOME="));
    assert!(cmd.starts_with("docker exec -it 'devkit-zed-dev-agent-2' bash -lc "));
}

#[test]
fn identity_is_quoted_into_git_config() {
    let mut o = opts();
    o.container_name = "c1".to_string();
    o.git_identity = Some(GitIdentity {
        name: "O'Brien".to_string(),
        email: "o@example.com".to_string(),
    });
    let cmd = build_command(&o).expect("builds");
    assert!(cmd.contains("git config --global user.name"));
    assert!(cmd.contains("git config --global user.email"));
    assert!(cmd.contains("Brien"), "quoted name survives the wrapping");
}

#[test]
fn unresolved_container_falls_back_to_label_poll_loop() {
    let cmd = build_command(&opts()).expect("builds");
    assert!(cmd.starts_with("name=''; for i in $(seq 1 120); do "));
    assert!(cmd.contains("label=com.docker.compose.project='devkit-zed'"));
    assert!(cmd.contains("label=com.docker.compose.service='dev-agent'"));
    assert!(cmd.contains("sed -n '2p'"));
    // Fallbacks: compose-file listing and service-only labels, then index 1.
    assert!(cmd.contains("docker compose -f /kit/compose.yml ps"));
    assert!(cmd.contains("sed -n '1p'"));
    assert!(cmd.contains("No container for devkit-zed/dev-agent yet."));
}

#[test]
fn seed_codex_false_skips_credential_copy() {
    let mut o = opts();
    o.container_name = "c1".to_string();
    o.seed_codex = false;
    let cmd = build_command(&o).expect("builds");
    assert!(!cmd.contains("/var/host-codex"));
}

#[test]
fn multi_repo_overlay_uses_its_anchor() {
    let mut o = opts();
    o.project = "dev-all".to_string();
    o.container_name = "c1".to_string();
    let cmd = build_command(&o).expect("builds");
    assert!(cmd.contains("/workspaces/dev/.devhome"));
}

#[test]
fn invalid_index_defaults_to_one() {
    let mut o = opts();
    o.index = "zero".to_string();
    let cmd = build_command(&o).expect("builds");
    assert!(cmd.contains("sed -n '1p'"));
}

#[test]
fn seed_tracker_fires_once_per_name() {
    let tracker = SeedTracker::new();
    assert!(tracker.should_seed("agent-1"));
    assert!(!tracker.should_seed("agent-1"));
    assert!(tracker.should_seed("agent-2"));
    // Empty names always seed; there is nothing to key on.
    assert!(tracker.should_seed(""));
    assert!(tracker.should_seed(""));
}
