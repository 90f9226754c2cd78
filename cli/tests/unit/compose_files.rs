//! Compose file-set resolution.

#![allow(clippy::expect_used)]

use std::path::Path;

use devkit_cli::infra::compose::{
    all_profiles_files, compose_project_env_key, default_compose_project, files, find_overlay_dir,
    find_overlay_file, KitPaths,
};

fn kit(root: &Path) -> KitPaths {
    KitPaths {
        root: root.to_path_buf(),
        kit: root.join("kit"),
        overlay_paths: vec![root.join("overlays")],
    }
}

fn file_names(args: &[String]) -> Vec<String> {
    args.iter()
        .filter(|a| *a != "-f")
        .map(|a| {
            Path::new(a)
                .file_name()
                .expect("file name")
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

#[test]
fn default_profile_is_dns() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = kit(dir.path());
    let args = files(&paths, "", "").expect("files");
    assert_eq!(file_names(&args), vec!["compose.yml", "compose.dns.yml"]);
}

#[test]
fn profiles_append_in_declared_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = kit(dir.path());
    let args = files(&paths, "", "hardened,dns,envoy,pool").expect("files");
    assert_eq!(
        file_names(&args),
        vec![
            "compose.yml",
            "compose.hardened.yml",
            "compose.dns.yml",
            "compose.envoy.yml",
            "compose.pool.yml",
        ]
    );
}

#[test]
fn unknown_profile_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = kit(dir.path());
    let err = files(&paths, "", "dns,bogus").expect_err("unknown profile");
    assert!(err.to_string().contains("unknown profile: bogus"));
}

#[test]
fn overlay_override_is_appended_when_present() {
    let dir = tempfile::tempdir().expect("tempdir");
    let overlay_dir = dir.path().join("overlays").join("zed");
    std::fs::create_dir_all(&overlay_dir).expect("mkdir");
    std::fs::write(overlay_dir.join("compose.override.yml"), "services: {}\n").expect("write");

    let paths = kit(dir.path());
    let args = files(&paths, "zed", "dns").expect("files");
    assert_eq!(
        file_names(&args),
        vec!["compose.yml", "compose.dns.yml", "compose.override.yml"]
    );
}

#[test]
fn missing_workspace_fails_resolution() {
    let dir = tempfile::tempdir().expect("tempdir");
    let overlay_dir = dir.path().join("overlays").join("zed");
    std::fs::create_dir_all(&overlay_dir).expect("mkdir");
    std::fs::write(overlay_dir.join("devkit.yaml"), "workspace: ./does-not-exist\n")
        .expect("write");

    let paths = kit(dir.path());
    let err = files(&paths, "zed", "dns").expect_err("missing workspace");
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn all_profiles_includes_proxy_variants() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = kit(dir.path());
    let args = all_profiles_files(&paths, "");
    assert_eq!(
        file_names(&args),
        vec![
            "compose.yml",
            "compose.hardened.yml",
            "compose.dns.yml",
            "compose.envoy.yml",
        ]
    );
}

#[test]
fn overlay_lookup_helpers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let overlay_dir = dir.path().join("overlays").join("zed");
    std::fs::create_dir_all(&overlay_dir).expect("mkdir");
    std::fs::write(overlay_dir.join("devkit.yaml"), "service: x\n").expect("write");

    let roots = vec![dir.path().join("overlays")];
    assert!(find_overlay_file(&roots, "zed", "devkit.yaml").is_some());
    assert!(find_overlay_file(&roots, "zed", "compose.override.yml").is_none());
    assert_eq!(find_overlay_dir(&roots, "zed").expect("dir"), overlay_dir);
    assert!(find_overlay_dir(&roots, "ghost").is_none());
}

#[test]
fn compose_project_naming_rules() {
    assert_eq!(default_compose_project(""), "devkit");
    assert_eq!(default_compose_project("codex"), "devkit");
    assert_eq!(default_compose_project("dev-all"), "devkit-dev-all");
    assert_eq!(compose_project_env_key("dev-all"), "DEVKIT_COMPOSE_PROJECT_DEV_ALL");
    assert_eq!(compose_project_env_key(""), "DEVKIT_COMPOSE_PROJECT_DEFAULT");
}
