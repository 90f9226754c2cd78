//! Reads overlay `devkit.yaml`, the host config, and env-include files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::overlay::{HostConfig, OverlayConfig};

/// Parse `overlays/<project>/devkit.yaml` from the first search root that has
/// one. A missing file yields the default config; a malformed file is an
/// error.
pub fn read_overlay(
    overlay_paths: &[PathBuf],
    project: &str,
) -> Result<(OverlayConfig, Option<PathBuf>)> {
    if project.trim().is_empty() {
        return Ok((OverlayConfig::default(), None));
    }
    for root in overlay_paths {
        let candidate = root.join(project).join("devkit.yaml");
        let data = match std::fs::read_to_string(&candidate) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", candidate.display()));
            }
        };
        let cfg: OverlayConfig = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing {}", candidate.display()))?;
        return Ok((cfg, candidate.parent().map(Path::to_path_buf)));
    }
    Ok((OverlayConfig::default(), None))
}

/// Read the host config from `$DEVKIT_CONFIG` or the user config dir.
/// Missing files are not an error.
pub fn read_host_config() -> Result<(HostConfig, Option<PathBuf>)> {
    let path = match std::env::var("DEVKIT_CONFIG") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => {
            let Some(dir) = dirs::config_dir().or_else(|| {
                dirs::home_dir().map(|h| h.join(".config"))
            }) else {
                return Ok((HostConfig::default(), None));
            };
            dir.join("devkit").join("config.yaml")
        }
    };
    let data = match std::fs::read_to_string(&path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok((HostConfig::default(), path.parent().map(Path::to_path_buf)));
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let cfg: HostConfig =
        serde_yaml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok((cfg, path.parent().map(Path::to_path_buf)))
}

/// Parse `KEY=VALUE` lines; `#` starts a comment line, blank lines skip.
#[must_use]
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for line in content.lines() {
        let raw = line.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = raw.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                out.push((key.to_string(), value.trim().to_string()));
            }
        }
    }
    out
}

/// Export the overlay's env map and env-include files into the process
/// environment so compose substitution sees them. Variables already set in
/// the environment are left untouched.
pub fn apply_overlay_env(cfg: &OverlayConfig, overlay_dir: Option<&Path>, root: &Path) -> Result<()> {
    for (key, value) in &cfg.env {
        set_if_unset(key, value);
    }
    for file in &cfg.env_files {
        let path = Path::new(file);
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            overlay_dir.unwrap_or(root).join(path)
        };
        let content = std::fs::read_to_string(&resolved)
            .with_context(|| format!("reading env file {}", resolved.display()))?;
        for (key, value) in parse_env_file(&content) {
            set_if_unset(&key, &value);
        }
    }
    Ok(())
}

fn set_if_unset(key: &str, value: &str) {
    if std::env::var_os(key).is_none() {
        std::env::set_var(key, value);
    }
}
