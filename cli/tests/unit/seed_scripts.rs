//! Seed snippet rendering.

use devkit_cli::seed::scripts::{
    build_anchor_scripts, build_seed_scripts, join_scripts, pool_seed_scripts,
    seed_codex_once_script, sh_single_quote, AnchorConfig,
};

fn anchor_cfg(seed_codex: bool) -> AnchorConfig {
    AnchorConfig {
        anchor: "/workspace/.devhome".to_string(),
        base: "/workspace/.devhomes".to_string(),
        seed_codex,
    }
}

#[test]
fn anchor_script_repoints_symlink_atomically() {
    let scripts = build_anchor_scripts(&anchor_cfg(false));
    let joined = join_scripts(&scripts);
    assert!(joined.contains("cid=$(hostname)"));
    assert!(joined.contains("chmod 700 \"$target/.ssh\""));
    assert!(joined.contains("ln -sfn \"$target\" \"/workspace/.devhome\""));
    // Without seed_codex there is no credential copy.
    assert!(!joined.contains("/var/host-codex"));
}

#[test]
fn codex_seed_is_marker_guarded() {
    let script = seed_codex_once_script("/workspace/.devhome");
    assert!(script.starts_with("if [ ! -f '/workspace/.devhome/.codex/.seeded' ]"));
    assert!(script.contains("touch '/workspace/.devhome/.codex/.seeded'"));
    assert!(script.contains("cp -a /var/host-codex/."));
    assert!(script.contains("chmod 600"));
}

#[test]
fn seed_scripts_wait_then_reset_then_copy() {
    let scripts = build_seed_scripts("/h");
    assert!(scripts[0].contains("seq 1 20"));
    assert!(scripts[1].starts_with("rm -rf '/h/.codex'"));
    assert!(scripts[2].contains("/var/host-codex"));
    assert!(scripts[3].contains("/var/auth.json"));
    assert!(scripts[4].contains("chmod 600"));
}

#[test]
fn anchor_scripts_include_codex_seed_when_requested() {
    let with = join_scripts(&build_anchor_scripts(&anchor_cfg(true)));
    assert!(with.contains(".codex/.seeded"));
}

#[test]
fn empty_anchor_or_base_yields_no_scripts() {
    let cfg = AnchorConfig {
        anchor: "  ".to_string(),
        base: "/workspace/.devhomes".to_string(),
        seed_codex: true,
    };
    assert!(build_anchor_scripts(&cfg).is_empty());
}

#[test]
fn pool_seed_copies_slot_contents() {
    let scripts = pool_seed_scripts("/var/codex-pool/slot-a", "/h");
    let joined = join_scripts(&scripts);
    assert!(joined.contains("rm -rf '/h/.codex'"));
    assert!(joined.contains("cp -a '/var/codex-pool/slot-a/.' '/h/.codex/'"));
}

#[test]
fn join_scripts_drops_empties() {
    let joined = join_scripts(&["a".to_string(), "  ".to_string(), "b".to_string()]);
    assert_eq!(joined, "a; b");
}

#[test]
fn single_quoting_escapes_embedded_quotes() {
    assert_eq!(sh_single_quote(""), "''");
    assert_eq!(sh_single_quote("plain"), "'plain'");
    assert_eq!(sh_single_quote("it's"), r#"'it'"'"'s'"#);
}
