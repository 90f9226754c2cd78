//! Overlay config parsing and env-include semantics.

#![allow(clippy::expect_used)]

use std::path::Path;

use devkit_cli::domain::overlay::{resolve_workspace, OverlayConfig};
use devkit_cli::infra::overlay_store::{parse_env_file, read_overlay};

fn write_overlay(root: &Path, project: &str, yaml: &str) {
    let dir = root.join(project);
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(dir.join("devkit.yaml"), yaml).expect("write");
}

#[test]
fn full_overlay_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_overlay(
        dir.path(),
        "zed",
        r"
service: frontend
workspace: ../src
env:
  FOO: bar
env_files:
  - extra.env
hooks:
  warm: make warm
  maintain: make clean
defaults:
  agents: 3
  repo: zed-app
  base_branch: main
  branch_prefix: agent
  profiles: dns,envoy
ingress:
  kind: caddy
  hosts: [app.test]
  routes:
    - host: app.test
      service: 'dev-agent@1'
      port: 3000
",
    );
    let (cfg, overlay_dir) =
        read_overlay(&[dir.path().to_path_buf()], "zed").expect("read overlay");
    assert_eq!(cfg.service, "frontend");
    assert_eq!(cfg.defaults.agents, 3);
    assert_eq!(cfg.defaults.repo, "zed-app");
    assert_eq!(cfg.hooks.warm, "make warm");
    assert_eq!(cfg.env.get("FOO").map(String::as_str), Some("bar"));
    let ingress = cfg.ingress.expect("ingress parsed");
    assert_eq!(ingress.routes[0].port, 3000);
    assert_eq!(overlay_dir.expect("dir"), dir.path().join("zed"));
}

#[test]
fn missing_overlay_yields_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (cfg, overlay_dir) =
        read_overlay(&[dir.path().to_path_buf()], "ghost").expect("read overlay");
    assert!(cfg.service.is_empty());
    assert!(overlay_dir.is_none());
}

#[test]
fn malformed_overlay_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_overlay(dir.path(), "bad", "service: [unterminated");
    assert!(read_overlay(&[dir.path().to_path_buf()], "bad").is_err());
}

#[test]
fn first_search_root_wins() {
    let first = tempfile::tempdir().expect("tempdir");
    let second = tempfile::tempdir().expect("tempdir");
    write_overlay(first.path(), "zed", "service: one");
    write_overlay(second.path(), "zed", "service: two");
    let (cfg, _) = read_overlay(
        &[first.path().to_path_buf(), second.path().to_path_buf()],
        "zed",
    )
    .expect("read overlay");
    assert_eq!(cfg.service, "one");
}

#[test]
fn workspace_resolves_relative_to_overlay_dir() {
    let cfg = OverlayConfig {
        workspace: "../src".to_string(),
        ..Default::default()
    };
    let resolved = resolve_workspace(
        &cfg,
        Some(Path::new("/kit/overlays/zed")),
        Path::new("/kit"),
    )
    .expect("workspace");
    assert_eq!(resolved, Path::new("/kit/overlays/src"));

    let absolute = OverlayConfig {
        workspace: "/srv/code".to_string(),
        ..Default::default()
    };
    assert_eq!(
        resolve_workspace(&absolute, None, Path::new("/kit")).expect("workspace"),
        Path::new("/srv/code")
    );
    assert!(resolve_workspace(&OverlayConfig::default(), None, Path::new("/kit")).is_none());
}

#[test]
fn env_file_parsing_skips_comments_and_blanks() {
    let parsed = parse_env_file("# comment\nFOO=bar\n\nBAZ = qux \n=ignored\nNOEQ\n");
    assert_eq!(
        parsed,
        vec![
            ("FOO".to_string(), "bar".to_string()),
            ("BAZ".to_string(), "qux".to_string()),
        ]
    );
}
