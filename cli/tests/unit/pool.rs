//! Credential pool discovery and assignment.

#![allow(clippy::expect_used)]

use std::collections::HashSet;

use devkit_cli::seed::pool::{discover, Assigner, Slot};

fn slots(names: &[&str]) -> Vec<Slot> {
    names
        .iter()
        .map(|n| Slot {
            name: (*n).to_string(),
            path: format!("/pool/{n}"),
        })
        .collect()
}

#[test]
fn discover_returns_sorted_subdirectories() {
    let dir = tempfile::tempdir().expect("tempdir");
    for name in ["charlie", "alpha", "bravo"] {
        std::fs::create_dir(dir.path().join(name)).expect("mkdir");
    }
    std::fs::write(dir.path().join("not-a-slot.txt"), b"x").expect("write");

    let found = discover(dir.path()).expect("discover");
    let names: Vec<&str> = found.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
}

#[test]
fn discover_missing_dir_is_empty_not_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("nope");
    assert!(discover(&missing).expect("discover").is_empty());
}

#[test]
fn by_index_wraps_modulo() {
    let slots = slots(&["a", "b", "c"]);
    let assigner = Assigner::by_index();
    assert_eq!(assigner.assign(&slots, 1).name, "a");
    assert_eq!(assigner.assign(&slots, 2).name, "b");
    assert_eq!(assigner.assign(&slots, 3).name, "c");
    assert_eq!(assigner.assign(&slots, 4).name, "a");
}

#[test]
fn shuffle_is_deterministic_per_seed() {
    let slots = slots(&["a", "b", "c", "d", "e"]);
    let first = Assigner::shuffle(slots.len(), 42);
    let second = Assigner::shuffle(slots.len(), 42);
    for agent in 1..=5 {
        assert_eq!(
            first.assign(&slots, agent).name,
            second.assign(&slots, agent).name
        );
    }
}

#[test]
fn shuffle_is_a_permutation() {
    let slots = slots(&["a", "b", "c", "d", "e"]);
    let assigner = Assigner::shuffle(slots.len(), 7);
    let assigned: HashSet<String> = (1..=5)
        .map(|agent| assigner.assign(&slots, agent).name.clone())
        .collect();
    assert_eq!(assigned.len(), 5, "every slot is used exactly once");
}
