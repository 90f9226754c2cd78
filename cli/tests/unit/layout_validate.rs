//! Static layout checks.

#![allow(clippy::expect_used)]

use devkit_cli::domain::layout::{validate, LayoutFile};

fn parse(yaml: &str) -> LayoutFile {
    serde_yaml::from_str(yaml).expect("layout parses")
}

#[test]
fn valid_layout_has_no_findings() {
    let layout = parse(
        r"
session: demo
overlays:
  - project: zed
    service: dev-agent
    count: 2
windows:
  - index: 1
    project: zed
    path: /workspace
    name: zed-1
  - index: 2
    project: zed
    path: /workspace
    name: zed-2
",
    );
    let (warnings, errors) = validate(&layout, "");
    assert!(warnings.is_empty(), "{warnings:?}");
    assert!(errors.is_empty(), "{errors:?}");
}

#[test]
fn window_index_below_one_is_an_error() {
    let layout = parse(
        r"
windows:
  - index: 0
    project: zed
    name: broken
",
    );
    let (_, errors) = validate(&layout, "");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("invalid index 0"));
}

#[test]
fn missing_project_without_default_is_an_error() {
    let layout = parse(
        r"
windows:
  - index: 1
    name: orphan
",
    );
    let (_, errors) = validate(&layout, "");
    assert!(errors[0].contains("missing a project"));

    // The same window passes once a default project is supplied.
    let (_, errors) = validate(&layout, "zed");
    assert!(errors.is_empty());
}

#[test]
fn index_beyond_overlay_count_is_an_error() {
    let layout = parse(
        r"
overlays:
  - project: zed
    count: 2
windows:
  - index: 3
    project: zed
",
    );
    let (_, errors) = validate(&layout, "");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("requires container index 3 but overlay count is 2"));
}

#[test]
fn duplicate_target_is_a_warning() {
    let layout = parse(
        r"
overlays:
  - project: zed
    count: 1
windows:
  - index: 1
    project: zed
    name: first
  - index: 1
    project: zed
    name: second
",
    );
    let (warnings, errors) = validate(&layout, "");
    assert!(errors.is_empty());
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("multiple windows target zed/dev-agent index 1"));
}

#[test]
fn unknown_overlay_is_a_warning() {
    let layout = parse(
        r"
windows:
  - index: 1
    project: ghost
",
    );
    let (warnings, errors) = validate(&layout, "");
    assert!(errors.is_empty());
    assert!(warnings[0].contains("no overlay defined for project ghost"));
}

#[test]
fn findings_are_sorted_for_stable_output() {
    let layout = parse(
        r"
windows:
  - index: 0
    project: zzz
    name: z
  - index: 0
    project: aaa
    name: a
",
    );
    let (_, errors) = validate(&layout, "");
    let mut sorted = errors.clone();
    sorted.sort();
    assert_eq!(errors, sorted);
}
