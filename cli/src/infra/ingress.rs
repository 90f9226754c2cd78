//! Generated compose fragments for overlay HTTPS ingress.
//!
//! When an overlay declares ingress, a temporary compose fragment mounts a
//! Caddyfile (user-provided or generated from routes) plus any cert/key
//! pairs, publishes the ingress port, and joins both overlay networks.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::error::ConfigError;
use crate::domain::hosts::sanitize;
use crate::domain::overlay::{normalize, IngressConfig, IngressRoute};
use crate::infra::compose::compose_project_name;

const INGRESS_IMAGE: &str = "caddy:2.7.6-alpine";
const PORT_MAPPING: &str = "${DEVKIT_INGRESS_PORT:-8443}:443";

/// Render the compose fragment for an overlay's ingress declaration.
/// Returns the fragment path, or `None` for overlays without ingress.
pub fn build_fragment(
    project: &str,
    cfg: &IngressConfig,
    overlay_dir: Option<&Path>,
    root: &Path,
) -> Result<Option<PathBuf>> {
    let kind = cfg.kind.trim().to_lowercase();
    if !kind.is_empty() && kind != "caddy" {
        return Err(ConfigError::IngressUnsupportedKind(cfg.kind.clone()).into());
    }

    let tmp_dir = std::env::temp_dir()
        .join("devkit-ingress")
        .join(sanitize(project));
    std::fs::create_dir_all(&tmp_dir)
        .with_context(|| format!("creating {}", tmp_dir.display()))?;

    let mut mounted: HashMap<PathBuf, String> = HashMap::new();
    let mut volumes: Vec<String> = Vec::new();
    // With a user-provided config the certs land next to it under /ingress;
    // generated configs keep them under /ingress/certs.
    let cert_target_dir = if cfg.config.trim().is_empty() {
        "/ingress/certs"
    } else {
        "/ingress"
    };

    let mut fallback_cert = String::new();
    let mut fallback_key = String::new();
    for (idx, cert) in cfg.certs.iter().enumerate() {
        let Some(dest) = mount_cert_file(
            &cert.path,
            overlay_dir,
            root,
            cert_target_dir,
            &mut mounted,
            &mut volumes,
        ) else {
            continue;
        };
        if idx == 0 {
            fallback_cert = dest;
        } else if idx == 1 {
            fallback_key = dest;
        }
    }

    let config_src = ensure_config_file(
        project,
        &tmp_dir,
        cfg,
        overlay_dir,
        root,
        &mut mounted,
        &mut volumes,
        &fallback_cert,
        &fallback_key,
    )?;
    volumes.push(format!("{}:/ingress/Caddyfile:ro", config_src.display()));

    let compose_path = tmp_dir.join("compose.ingress.yml");
    write_compose(&compose_path, &volumes, &cfg.env)?;
    Ok(Some(compose_path))
}

fn write_compose(path: &Path, volumes: &[String], extra_env: &HashMap<String, String>) -> Result<()> {
    let mut b = String::new();
    b.push_str("services:\n");
    b.push_str("  ingress:\n");
    let _ = writeln!(b, "    image: {INGRESS_IMAGE}");
    b.push_str("    command: [\"caddy\", \"run\", \"--config\", \"/ingress/Caddyfile\"]\n");
    b.push_str("    working_dir: /ingress\n");
    if !volumes.is_empty() {
        b.push_str("    volumes:\n");
        for vol in volumes {
            let _ = writeln!(b, "      - {vol}");
        }
    }
    if !extra_env.is_empty() {
        b.push_str("    environment:\n");
        let mut keys: Vec<&String> = extra_env.keys().collect();
        keys.sort();
        for k in keys {
            let _ = writeln!(b, "      - {k}={}", extra_env[k]);
        }
    }
    b.push_str("    networks:\n");
    b.push_str("      - dev-internal\n");
    b.push_str("      - dev-egress\n");
    b.push_str("    ports:\n");
    let _ = writeln!(b, "      - \"{PORT_MAPPING}\"");
    std::fs::write(path, b).with_context(|| format!("writing {}", path.display()))
}

#[allow(clippy::too_many_arguments)]
fn ensure_config_file(
    project: &str,
    tmp_dir: &Path,
    cfg: &IngressConfig,
    overlay_dir: Option<&Path>,
    root: &Path,
    mounted: &mut HashMap<PathBuf, String>,
    volumes: &mut Vec<String>,
    fallback_cert: &str,
    fallback_key: &str,
) -> Result<PathBuf> {
    if !cfg.config.trim().is_empty() {
        return resolve_path(&cfg.config, overlay_dir, root)
            .ok_or_else(|| ConfigError::IngressConfigMissing.into());
    }
    if cfg.routes.is_empty() {
        return Err(ConfigError::IngressConfigMissing.into());
    }
    let dest = tmp_dir.join("Caddyfile.generated");
    let mut b = String::new();
    for route in &cfg.routes {
        let host = route.host.trim();
        let svc = resolve_service_name(route.service.trim(), project);
        if host.is_empty() || svc.is_empty() || route.port == 0 {
            return Err(ConfigError::IngressInvalidRoute(route.host.clone()).into());
        }
        let _ = writeln!(b, "{host} {{");
        let (cert_path, key_path) = resolve_route_certs(
            route,
            overlay_dir,
            root,
            mounted,
            volumes,
            fallback_cert,
            fallback_key,
        )?;
        if !cert_path.is_empty() && !key_path.is_empty() {
            let _ = writeln!(b, "  tls {cert_path} {key_path}");
        } else {
            b.push_str("  tls internal\n");
        }
        let _ = writeln!(b, "  reverse_proxy {svc}:{}", route.port);
        b.push_str("}\n\n");
    }
    std::fs::write(&dest, b).with_context(|| format!("writing {}", dest.display()))?;
    Ok(dest)
}

/// Expand service placeholders: `{project}` → compose project name,
/// `dev-agent@<n>` → `<compose-project>-dev-agent-<n>`.
fn resolve_service_name(service: &str, project: &str) -> String {
    if service.is_empty() {
        return String::new();
    }
    let compose_project = compose_project_name(project);
    if service.contains("{project}") && !compose_project.is_empty() {
        return service.replace("{project}", &compose_project);
    }
    if let Some(index) = service.strip_prefix("dev-agent@") {
        let index = index.trim();
        if !index.is_empty() && !compose_project.is_empty() {
            return format!("{compose_project}-dev-agent-{index}");
        }
    }
    service.to_string()
}

fn resolve_route_certs(
    route: &IngressRoute,
    overlay_dir: Option<&Path>,
    root: &Path,
    mounted: &mut HashMap<PathBuf, String>,
    volumes: &mut Vec<String>,
    fallback_cert: &str,
    fallback_key: &str,
) -> Result<(String, String)> {
    let cert_raw = route.cert.trim();
    let key_raw = route.key.trim();
    if !cert_raw.is_empty() || !key_raw.is_empty() {
        if cert_raw.is_empty() || key_raw.is_empty() {
            return Err(ConfigError::IngressCertIncomplete(route.host.clone()).into());
        }
        let cert = mount_cert_file(cert_raw, overlay_dir, root, "/ingress/certs", mounted, volumes);
        let key = mount_cert_file(key_raw, overlay_dir, root, "/ingress/certs", mounted, volumes);
        return match (cert, key) {
            (Some(c), Some(k)) => Ok((c, k)),
            _ => Err(ConfigError::IngressCertIncomplete(route.host.clone()).into()),
        };
    }
    if !fallback_cert.is_empty() && !fallback_key.is_empty() {
        return Ok((fallback_cert.to_string(), fallback_key.to_string()));
    }
    Ok((String::new(), String::new()))
}

/// Add a read-only mount for a cert file, deduplicated by resolved source.
/// Returns the in-container destination path.
fn mount_cert_file(
    raw: &str,
    overlay_dir: Option<&Path>,
    root: &Path,
    target_dir: &str,
    mounted: &mut HashMap<PathBuf, String>,
    volumes: &mut Vec<String>,
) -> Option<String> {
    let resolved = resolve_path(raw, overlay_dir, root)?;
    if let Some(dest) = mounted.get(&resolved) {
        return Some(dest.clone());
    }
    let base = resolved.file_name()?.to_string_lossy().into_owned();
    let target = format!("{target_dir}/{base}");
    volumes.push(format!("{}:{}:ro", resolved.display(), target));
    mounted.insert(resolved, target.clone());
    Some(target)
}

fn resolve_path(p: &str, overlay_dir: Option<&Path>, root: &Path) -> Option<PathBuf> {
    let raw = p.trim();
    if raw.is_empty() {
        return None;
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        return Some(path.to_path_buf());
    }
    Some(normalize(&overlay_dir.unwrap_or(root).join(path)))
}
