//! Managed hosts-block transforms.

#![allow(clippy::expect_used)]

use devkit_cli::domain::hosts::{
    collect_ingress_hosts, missing_mappings, parse_mappings, render_block, upsert_block,
};
use proptest::prelude::*;

#[test]
fn hosts_are_deduplicated_lowercased_sorted() {
    let raw = vec![
        "App.Example.test".to_string(),
        "api.example.test".to_string(),
        " app.example.test ".to_string(),
        String::new(),
    ];
    assert_eq!(
        collect_ingress_hosts(&raw),
        vec!["api.example.test".to_string(), "app.example.test".to_string()]
    );
}

#[test]
fn render_produces_marker_delimited_block() {
    let block = render_block("zed", "127.0.0.1", &["app.test".to_string()]);
    assert_eq!(
        block,
        "# devkit:zed:ingress:start\n127.0.0.1 app.test\n# devkit:zed:ingress:end\n"
    );
}

#[test]
fn upsert_is_idempotent() {
    let hosts = vec!["app.test".to_string(), "api.test".to_string()];
    let once = upsert_block("127.0.0.1 localhost\n", "zed", "127.0.0.1", &hosts).expect("upsert");
    let twice = upsert_block(&once, "zed", "127.0.0.1", &hosts).expect("upsert");
    assert_eq!(once, twice);
    assert!(missing_mappings(&twice, "127.0.0.1", &hosts).is_empty());
}

#[test]
fn upsert_replaces_an_existing_block_in_place() {
    let hosts = vec!["app.test".to_string()];
    let original =
        upsert_block("127.0.0.1 localhost\n", "zed", "10.0.0.5", &hosts).expect("upsert");
    let updated = upsert_block(&original, "zed", "10.0.0.9", &hosts).expect("upsert");
    assert!(updated.contains("10.0.0.9 app.test"));
    assert!(!updated.contains("10.0.0.5"));
    assert_eq!(updated.matches("# devkit:zed:ingress:start").count(), 1);
}

#[test]
fn incomplete_markers_are_an_error() {
    let broken = "# devkit:zed:ingress:start\n1.2.3.4 app.test\n";
    let err = upsert_block(broken, "zed", "127.0.0.1", &["app.test".to_string()])
        .expect_err("mismatched markers");
    assert!(err.to_string().contains("incomplete"));
}

#[test]
fn different_projects_keep_separate_blocks() {
    let hosts_a = vec!["a.test".to_string()];
    let hosts_b = vec!["b.test".to_string()];
    let content = upsert_block("", "alpha", "127.0.0.1", &hosts_a).expect("upsert");
    let content = upsert_block(&content, "beta", "10.1.1.1", &hosts_b).expect("upsert");
    assert!(missing_mappings(&content, "127.0.0.1", &hosts_a).is_empty());
    assert!(missing_mappings(&content, "10.1.1.1", &hosts_b).is_empty());
}

#[test]
fn parse_skips_comments_and_blank_lines() {
    let mappings = parse_mappings("# comment\n\n127.0.0.1 localhost App.Test\n::1 ip6\n");
    assert_eq!(mappings.get("localhost").map(String::as_str), Some("127.0.0.1"));
    assert_eq!(mappings.get("app.test").map(String::as_str), Some("127.0.0.1"));
    assert_eq!(mappings.get("ip6").map(String::as_str), Some("::1"));
}

#[test]
fn missing_mappings_reports_wrong_ip() {
    let content = "1.2.3.4 app.test\n";
    let missing = missing_mappings(content, "127.0.0.1", &["app.test".to_string()]);
    assert_eq!(missing, vec!["app.test".to_string()]);
}

proptest! {
    /// Upsert followed by upsert is a fixed point for arbitrary hostnames.
    #[test]
    fn prop_upsert_idempotent(
        names in proptest::collection::vec("[a-z]{1,8}\\.test", 1..4),
        prefix in "[ -~]{0,40}",
    ) {
        let hosts: Vec<String> = names;
        let base = format!("{prefix}\n");
        let once = upsert_block(&base, "prop", "127.0.0.1", &hosts).expect("upsert");
        let twice = upsert_block(&once, "prop", "127.0.0.1", &hosts).expect("upsert");
        prop_assert_eq!(&once, &twice);
        prop_assert!(missing_mappings(&once, "127.0.0.1", &hosts).is_empty());
    }
}
