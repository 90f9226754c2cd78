//! Managed blocks in hosts files.
//!
//! A managed block is a region of `/etc/hosts` delimited by
//! `# devkit:<project>:ingress:start` / `:end` markers that this tool owns
//! and rewrites idempotently. The same transform runs against agent
//! containers' hosts files.

use std::collections::HashMap;

use anyhow::{bail, Result};

/// Deduplicated, lowercased, sorted ingress hostnames.
#[must_use]
pub fn collect_ingress_hosts(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for host in raw {
        let trimmed = host.trim().to_lowercase();
        if trimmed.is_empty() || out.contains(&trimmed) {
            continue;
        }
        out.push(trimmed);
    }
    out.sort();
    out
}

fn marker_start(project: &str) -> String {
    format!("# devkit:{}:ingress:start", sanitize(project))
}

fn marker_end(project: &str) -> String {
    format!("# devkit:{}:ingress:end", sanitize(project))
}

/// Render the managed block for a project, or an empty string when there are
/// no hostnames to map.
#[must_use]
pub fn render_block(project: &str, ip: &str, hosts: &[String]) -> String {
    let entries = collect_ingress_hosts(hosts);
    if entries.is_empty() {
        return String::new();
    }
    format!(
        "{}\n{} {}\n{}\n",
        marker_start(project),
        ip.trim(),
        entries.join(" "),
        marker_end(project)
    )
}

/// Insert or replace the managed block, returning the updated content.
/// Applying the same upsert twice yields the same string.
///
/// # Errors
///
/// Returns an error when the existing content has mismatched or out-of-order
/// markers for this project.
pub fn upsert_block(existing: &str, project: &str, ip: &str, hosts: &[String]) -> Result<String> {
    let block = render_block(project, ip, hosts);
    if block.trim().is_empty() {
        return Ok(existing.to_string());
    }
    let start = marker_start(project);
    let end = marker_end(project);
    let start_idx = existing.find(&start);
    let end_idx = existing.find(&end);
    match (start_idx, end_idx) {
        (Some(_), None) | (None, Some(_)) => {
            bail!("hosts block markers are incomplete for project {project}")
        }
        (Some(s), Some(e)) => {
            if e < s {
                bail!("hosts block markers are out of order for project {project}")
            }
            let mut end_line = e + end.len();
            if existing.as_bytes().get(end_line) == Some(&b'\n') {
                end_line += 1;
            }
            Ok(format!("{}{}{}", &existing[..s], block, &existing[end_line..]))
        }
        (None, None) => {
            let mut out = existing.to_string();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            if !out.trim().is_empty() {
                out.push('\n');
            }
            out.push_str(&block);
            Ok(out)
        }
    }
}

/// Parse hosts-file content into hostname → IP mappings.
#[must_use]
pub fn parse_mappings(content: &str) -> HashMap<String, String> {
    let mut mappings = HashMap::new();
    for line in content.lines() {
        let raw = line.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        let mut fields = raw.split_whitespace();
        let Some(ip) = fields.next() else { continue };
        for host in fields {
            let trimmed = host.trim().to_lowercase();
            if !trimmed.is_empty() {
                mappings.insert(trimmed, ip.to_string());
            }
        }
    }
    mappings
}

/// Hostnames that do not currently map to the expected IP.
#[must_use]
pub fn missing_mappings(content: &str, ip: &str, hosts: &[String]) -> Vec<String> {
    let expected = collect_ingress_hosts(hosts);
    let mappings = parse_mappings(content);
    expected
        .into_iter()
        .filter(|host| mappings.get(host).map(String::as_str) != Some(ip))
        .collect()
}

/// Restrict a project name to marker-safe characters.
#[must_use]
pub fn sanitize(project: &str) -> String {
    let project = project.trim();
    let project = if project.is_empty() { "default" } else { project };
    project
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
