//! CLI integration tests: argument surface, exit codes, and dry-run plans.
//!
//! Every invocation pins DEVKIT_INTERNAL_SUBNET so the pre-dispatch subnet
//! pick never probes the host, and DEVKIT_NO_TMUX so no windows appear.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn devkit() -> Command {
    let mut cmd = Command::cargo_bin("devkit").expect("devkit binary should exist");
    cmd.env("DEVKIT_INTERNAL_SUBNET", "172.30.99.0/24")
        .env("DEVKIT_DNS_IP", "172.30.99.53")
        .env("DEVKIT_NO_TMUX", "1");
    cmd
}

// --- Help and misuse ---

#[test]
fn no_args_shows_help_and_exits_two() {
    devkit()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn help_lists_core_commands() {
    devkit()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("layout-apply"))
        .stdout(predicate::str::contains("worktrees-setup"))
        .stdout(predicate::str::contains("preflight"));
}

#[test]
fn up_without_project_is_misuse() {
    devkit()
        .arg("up")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("-p <project> is required"));
}

#[test]
fn scale_rejects_non_numeric_count() {
    devkit()
        .args(["-p", "codex", "scale", "lots"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("count must be a positive integer"));
}

#[test]
fn unknown_profile_is_misuse() {
    devkit()
        .args(["-p", "codex", "--profile", "bogus", "status"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown profile: bogus"));
}

// --- Dry run ---

#[test]
fn dry_run_up_prints_compose_plan() {
    devkit()
        .args(["--dry-run", "-p", "codex", "up"])
        .assert()
        .success()
        .stderr(predicate::str::contains("+ docker compose"))
        .stderr(predicate::str::contains("up -d"));
}

#[test]
fn dry_run_scale_includes_scale_flag() {
    devkit()
        .args(["--dry-run", "-p", "codex", "scale", "3"])
        .assert()
        .success()
        .stderr(predicate::str::contains("--scale dev-agent=3"));
}

#[test]
fn dry_run_down_prints_compose_down() {
    devkit()
        .args(["--dry-run", "-p", "codex", "down"])
        .assert()
        .success()
        .stderr(predicate::str::contains("down"));
}

// --- Layout validation ---

#[test]
fn layout_validate_accepts_a_clean_layout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = dir.path().join("layout.yaml");
    std::fs::write(
        &layout,
        "session: demo\noverlays:\n  - project: zed\n    count: 2\nwindows:\n  - index: 1\n    project: zed\n    name: zed-1\n",
    )
    .expect("write layout");
    devkit()
        .args(["layout-validate", "--file"])
        .arg(&layout)
        .assert()
        .success()
        .stdout(predicate::str::contains("layout OK"));
}

#[test]
fn layout_validate_rejects_out_of_range_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = dir.path().join("layout.yaml");
    std::fs::write(
        &layout,
        "overlays:\n  - project: zed\n    count: 1\nwindows:\n  - index: 5\n    project: zed\n",
    )
    .expect("write layout");
    devkit()
        .args(["layout-validate", "--file"])
        .arg(&layout)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("error:"));
}

#[test]
fn layout_validate_warns_about_unknown_overlay() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = dir.path().join("layout.yaml");
    std::fs::write(&layout, "windows:\n  - index: 1\n    project: ghost\n").expect("write layout");
    devkit()
        .args(["layout-validate", "--file"])
        .arg(&layout)
        .assert()
        .success()
        .stdout(predicate::str::contains("no overlay defined for project ghost"));
}

// --- Hosts ---

#[test]
fn hosts_print_reports_missing_ingress() {
    devkit()
        .args(["-p", "codex", "hosts", "print"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No ingress.hosts configured"));
}

#[test]
fn hosts_print_renders_managed_block_for_host_target() {
    let overlays = tempfile::tempdir().expect("tempdir");
    let overlay_dir = overlays.path().join("web");
    std::fs::create_dir_all(&overlay_dir).expect("mkdir");
    std::fs::write(
        overlay_dir.join("devkit.yaml"),
        "ingress:\n  config: Caddyfile\n  hosts: [app.test, api.test]\n",
    )
    .expect("write");

    devkit()
        .env("DEVKIT_OVERLAYS_DIR", overlays.path())
        .args(["-p", "web", "hosts", "print", "--target", "host"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# devkit:web:ingress:start"))
        .stdout(predicate::str::contains("127.0.0.1 api.test app.test"))
        .stdout(predicate::str::contains("# devkit:web:ingress:end"));
}

#[test]
fn hosts_check_flags_missing_mappings() {
    let overlays = tempfile::tempdir().expect("tempdir");
    let overlay_dir = overlays.path().join("web");
    std::fs::create_dir_all(&overlay_dir).expect("mkdir");
    std::fs::write(overlay_dir.join("devkit.yaml"), "ingress:\n  config: Caddyfile\n  hosts: [app.test]\n")
        .expect("write");
    let hosts_file = overlays.path().join("hosts");
    std::fs::write(&hosts_file, "127.0.0.1 localhost\n").expect("write hosts");

    devkit()
        .env("DEVKIT_OVERLAYS_DIR", overlays.path())
        .env("DEVKIT_HOSTS_FILE", &hosts_file)
        .args(["-p", "web", "hosts", "check", "--target", "host"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing mappings: app.test"));
}

#[test]
fn hosts_apply_writes_managed_block_to_hosts_file() {
    let overlays = tempfile::tempdir().expect("tempdir");
    let overlay_dir = overlays.path().join("web");
    std::fs::create_dir_all(&overlay_dir).expect("mkdir");
    std::fs::write(overlay_dir.join("devkit.yaml"), "ingress:\n  config: Caddyfile\n  hosts: [app.test]\n")
        .expect("write");
    let hosts_file = overlays.path().join("hosts");
    std::fs::write(&hosts_file, "127.0.0.1 localhost\n").expect("write hosts");

    devkit()
        .env("DEVKIT_OVERLAYS_DIR", overlays.path())
        .env("DEVKIT_HOSTS_FILE", &hosts_file)
        .args(["-p", "web", "hosts", "apply", "--target", "host"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied host entries"));

    let content = std::fs::read_to_string(&hosts_file).expect("read hosts");
    assert!(content.contains("127.0.0.1 app.test"));

    // Second apply converges without rewriting.
    devkit()
        .env("DEVKIT_OVERLAYS_DIR", overlays.path())
        .env("DEVKIT_HOSTS_FILE", &hosts_file)
        .args(["-p", "web", "hosts", "apply", "--target", "host"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already current"));
}

// --- Git identity enforcement ---

#[test]
fn exec_without_git_identity_is_fatal() {
    let home = tempfile::tempdir().expect("tempdir");
    devkit()
        .env("HOME", home.path())
        .env_remove("DEVKIT_GIT_USER_NAME")
        .env_remove("DEVKIT_GIT_USER_EMAIL")
        .env_remove("GIT_AUTHOR_NAME")
        .env_remove("GIT_AUTHOR_EMAIL")
        .env_remove("GIT_COMMITTER_NAME")
        .env_remove("GIT_COMMITTER_EMAIL")
        .env("GIT_CONFIG_GLOBAL", home.path().join("gitconfig"))
        .env("GIT_CONFIG_SYSTEM", home.path().join("gitconfig-system"))
        .args(["--dry-run", "-p", "codex", "exec", "1", "true"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("git identity not configured"));
}

// --- Worktrees (dry run) ---

#[test]
fn worktrees_setup_requires_multi_repo_overlay() {
    devkit()
        .args(["--dry-run", "-p", "codex", "worktrees-setup", "myrepo", "2"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Use -p dev-all"));
}

#[test]
fn worktrees_setup_dry_run_prints_git_plan() {
    devkit()
        .args(["--dry-run", "-p", "dev-all", "worktrees-setup", "myrepo", "2"])
        .assert()
        .success()
        .stderr(predicate::str::contains("fetch --all --prune"))
        .stderr(predicate::str::contains("worktree add"))
        .stderr(predicate::str::contains("-B agent2 origin/main"));
}
