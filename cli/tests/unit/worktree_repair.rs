//! Stale worktree detection and cleanup.

#![allow(clippy::expect_used)]

use std::path::Path;

use devkit_cli::infra::worktrees::clean_worktree_path;

fn write_git_file(wt: &Path, gitdir: &str) {
    std::fs::create_dir_all(wt).expect("mkdir");
    std::fs::write(wt.join(".git"), format!("gitdir: {gitdir}\n")).expect("write");
}

#[test]
fn missing_path_is_a_no_op() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wt = dir.path().join("absent");
    clean_worktree_path(None, &wt).expect("clean");
    assert!(!wt.exists());
}

#[test]
fn directory_without_git_metadata_is_removed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wt = dir.path().join("wt");
    std::fs::create_dir_all(wt.join("src")).expect("mkdir");
    clean_worktree_path(None, &wt).expect("clean");
    assert!(!wt.exists());
}

#[test]
fn git_file_without_gitdir_prefix_is_removed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wt = dir.path().join("wt");
    std::fs::create_dir_all(&wt).expect("mkdir");
    std::fs::write(wt.join(".git"), "something else\n").expect("write");
    clean_worktree_path(None, &wt).expect("clean");
    assert!(!wt.exists());
}

#[test]
fn dangling_gitdir_reference_is_removed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let wt = dir.path().join("wt");
    write_git_file(&wt, dir.path().join("gone").display().to_string().as_str());
    clean_worktree_path(None, &wt).expect("clean");
    assert!(!wt.exists());
}

#[test]
fn foreign_gitdir_is_removed_when_owner_known() {
    let dir = tempfile::tempdir().expect("tempdir");
    let owned = dir.path().join("repo/.git/worktrees");
    std::fs::create_dir_all(owned.join("agent2")).expect("mkdir");
    let foreign = dir.path().join("other-repo/.git/worktrees/agent2");
    std::fs::create_dir_all(&foreign).expect("mkdir");

    let wt = dir.path().join("wt");
    write_git_file(&wt, foreign.display().to_string().as_str());
    let owned = owned.canonicalize().expect("canonicalize");
    clean_worktree_path(Some(&owned), &wt).expect("clean");
    assert!(!wt.exists());
}

#[test]
fn valid_worktree_is_kept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let owned = dir.path().join("repo/.git/worktrees");
    let gitdir = owned.join("agent2");
    std::fs::create_dir_all(&gitdir).expect("mkdir");

    let wt = dir.path().join("wt");
    write_git_file(&wt, gitdir.display().to_string().as_str());
    let owned = owned.canonicalize().expect("canonicalize");
    clean_worktree_path(Some(&owned), &wt).expect("clean");
    assert!(wt.exists(), "a valid worktree must survive cleanup");
}

#[test]
fn relative_gitdir_resolves_from_the_worktree() {
    let dir = tempfile::tempdir().expect("tempdir");
    let owned = dir.path().join("repo/.git/worktrees");
    std::fs::create_dir_all(owned.join("agent3")).expect("mkdir");

    let wt = dir.path().join("wt");
    write_git_file(&wt, "../repo/.git/worktrees/agent3");
    let owned = owned.canonicalize().expect("canonicalize");
    clean_worktree_path(Some(&owned), &wt).expect("clean");
    assert!(wt.exists());
}
