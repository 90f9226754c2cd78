//! Compose file-set resolution and kit path detection.
//!
//! The kit ships a base `compose.yml` plus profile overlays; an overlay
//! directory can add `compose.override.yml` and a generated ingress
//! fragment. Profile policy is data-driven so the ordering stays declarative.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::domain::error::ConfigError;
use crate::domain::overlay::{normalize, resolve_workspace};
use crate::infra::{fsutil, ingress, overlay_store};

/// Profile name → compose file, in application order.
const PROFILE_FILES: &[(&str, &str)] = &[
    ("hardened", "compose.hardened.yml"),
    ("dns", "compose.dns.yml"),
    ("envoy", "compose.envoy.yml"),
    ("pool", "compose.pool.yml"),
];

/// Resolved locations of the kit and overlay search roots.
#[derive(Debug, Clone)]
pub struct KitPaths {
    /// Devkit root (parent of `kit/`).
    pub root: PathBuf,
    /// Directory holding compose files and proxy/dns assets.
    pub kit: PathBuf,
    /// Ordered overlay search roots.
    pub overlay_paths: Vec<PathBuf>,
}

impl KitPaths {
    /// Detect paths from the executable location, honoring `DEVKIT_ROOT` and
    /// `DEVKIT_OVERLAYS_DIR` overrides. The binary is expected under
    /// `<root>/kit/bin/devkit` when no override is set.
    #[must_use]
    pub fn detect(exe: &Path) -> Self {
        let root = match std::env::var("DEVKIT_ROOT") {
            Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
            _ => {
                let bin_dir = exe.parent().unwrap_or(Path::new("."));
                normalize(&bin_dir.join("..").join(".."))
            }
        };
        let root = normalize(&root);
        let kit = root.join("kit");
        let mut overlays = Vec::new();
        match std::env::var("DEVKIT_OVERLAYS_DIR") {
            Ok(v) if !v.trim().is_empty() => {
                for part in std::env::split_paths(&v) {
                    let part = if part.as_os_str().is_empty() {
                        continue;
                    } else if part.is_absolute() {
                        part
                    } else {
                        root.join(part)
                    };
                    let cleaned = normalize(&part);
                    if !overlays.contains(&cleaned) {
                        overlays.push(cleaned);
                    }
                }
            }
            _ => overlays.push(root.join("overlays")),
        }
        // Host config can contribute extra search roots after the defaults.
        if let Ok((host_cfg, _)) = overlay_store::read_host_config() {
            for extra in &host_cfg.overlay_paths {
                let p = PathBuf::from(extra);
                let p = if p.is_absolute() { p } else { root.join(p) };
                let cleaned = normalize(&p);
                if !overlays.contains(&cleaned) {
                    overlays.push(cleaned);
                }
            }
        }
        Self {
            root,
            kit,
            overlay_paths: overlays,
        }
    }
}

/// Build the ordered `-f <file>` argument list for an overlay + profile set.
///
/// # Errors
///
/// Fails on unknown profiles, unreadable overlay config, or an unusable
/// workspace directory.
pub fn files(paths: &KitPaths, project: &str, profile: &str) -> Result<Vec<String>> {
    let mut args = vec!["-f".to_string(), paths.kit.join("compose.yml").display().to_string()];

    let mut overlay_cfg = None;
    let mut overlay_dir = None;
    if !project.is_empty() {
        let (cfg, dir) = overlay_store::read_overlay(&paths.overlay_paths, project)?;
        if let Some(ws) = resolve_workspace(&cfg, dir.as_deref(), &paths.root) {
            fsutil::ensure_workspace_writable(&ws)?;
        }
        overlay_cfg = Some(cfg);
        overlay_dir = dir;
    }

    let eff = if profile.trim().is_empty() { "dns" } else { profile.trim() };
    for part in eff.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let file = PROFILE_FILES
            .iter()
            .find(|(name, _)| *name == part)
            .map(|(_, file)| *file)
            .ok_or_else(|| ConfigError::UnknownProfile(part.to_string()))?;
        args.push("-f".to_string());
        args.push(paths.kit.join(file).display().to_string());
    }

    if !project.is_empty() {
        if let Some(overlay) = find_overlay_file(&paths.overlay_paths, project, "compose.override.yml")
        {
            args.push("-f".to_string());
            args.push(overlay.display().to_string());
        }
        if let Some(cfg) = &overlay_cfg {
            if let Some(ing) = &cfg.ingress {
                if let Some(frag) =
                    ingress::build_fragment(project, ing, overlay_dir.as_deref(), &paths.root)?
                {
                    args.push("-f".to_string());
                    args.push(frag.display().to_string());
                }
            }
        }
    }
    Ok(args)
}

/// File args with every proxy profile included (hardened, dns, envoy) plus
/// the overlay override; used by teardown-style commands that must address
/// containers regardless of which profiles brought them up.
#[must_use]
pub fn all_profiles_files(paths: &KitPaths, project: &str) -> Vec<String> {
    let mut args = vec!["-f".to_string(), paths.kit.join("compose.yml").display().to_string()];
    for file in ["compose.hardened.yml", "compose.dns.yml", "compose.envoy.yml"] {
        args.push("-f".to_string());
        args.push(paths.kit.join(file).display().to_string());
    }
    if !project.is_empty() {
        if let Some(overlay) = find_overlay_file(&paths.overlay_paths, project, "compose.override.yml")
        {
            args.push("-f".to_string());
            args.push(overlay.display().to_string());
        }
    }
    args
}

/// First overlay search root containing `<project>/<name>` as a file.
#[must_use]
pub fn find_overlay_file(paths: &[PathBuf], project: &str, name: &str) -> Option<PathBuf> {
    paths
        .iter()
        .map(|root| root.join(project).join(name))
        .find(|candidate| candidate.is_file())
}

/// First overlay search root containing the project directory.
#[must_use]
pub fn find_overlay_dir(paths: &[PathBuf], project: &str) -> Option<PathBuf> {
    if project.trim().is_empty() {
        return None;
    }
    paths
        .iter()
        .map(|root| root.join(project))
        .find(|candidate| candidate.is_dir())
}

/// Compose project name for an overlay.
///
/// `COMPOSE_PROJECT_NAME` wins outright, then the per-project
/// `DEVKIT_COMPOSE_PROJECT_<PROJECT>` override, then `devkit` for the
/// default overlay and `devkit-<project>` otherwise.
#[must_use]
pub fn compose_project_name(project: &str) -> String {
    if let Ok(v) = std::env::var("COMPOSE_PROJECT_NAME") {
        if !v.trim().is_empty() {
            return v.trim().to_string();
        }
    }
    if let Ok(v) = std::env::var(compose_project_env_key(project)) {
        if !v.trim().is_empty() {
            return v.trim().to_string();
        }
    }
    default_compose_project(project)
}

/// The `devkit`/`devkit-<project>` naming rule without env overrides.
#[must_use]
pub fn default_compose_project(project: &str) -> String {
    match project.trim() {
        "" | "codex" => "devkit".to_string(),
        p => format!("devkit-{p}"),
    }
}

/// Env var key carrying a compose-project override for one overlay.
#[must_use]
pub fn compose_project_env_key(project: &str) -> String {
    let p = project.trim();
    let p = if p.is_empty() { "DEFAULT" } else { p };
    let suffix: String = p
        .to_uppercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("DEVKIT_COMPOSE_PROJECT_{suffix}")
}
