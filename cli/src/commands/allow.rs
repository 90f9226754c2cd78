//! Egress allowlist management: domains pass both the forward proxy and the
//! DNS allowlist, so one command updates both files.

use anyhow::Result;

use crate::commands::CmdContext;
use crate::domain::error::UsageError;
use crate::infra::compose::KitPaths;
use crate::infra::fsutil::append_line_if_missing;

pub fn allow(ctx: &CmdContext, domain: &str) -> Result<()> {
    let project = ctx.require_project()?;
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(UsageError::Message("allow requires <domain>".into()).into());
    }
    let (added_proxy, added_dns) = ensure_domain(&ctx.paths, domain)?;
    if added_proxy {
        println!("Added to proxy allowlist: {domain}");
    } else {
        println!("Already in proxy allowlist: {domain}");
    }
    if added_dns {
        println!("Added to DNS allowlist: {domain}");
    } else {
        println!("Already in DNS allowlist: {domain}");
    }
    println!("Note: restart dns and proxy to apply (devkit -p {project} restart)");
    Ok(())
}

/// Add a domain to the proxy allowlist and the dnsmasq resolver rules.
/// Returns (proxy added, dns added).
pub fn ensure_domain(paths: &KitPaths, domain: &str) -> Result<(bool, bool)> {
    let added_proxy =
        append_line_if_missing(&paths.kit.join("proxy").join("allowlist.txt"), domain)?;
    let dns_rule = format!("server=/{domain}/1.1.1.1");
    let added_dns =
        append_line_if_missing(&paths.kit.join("dns").join("dnsmasq.conf"), &dns_rule)?;
    Ok((added_proxy, added_dns))
}

/// Make sure `ssh.github.com` is reachable before any in-container git/ssh.
pub fn ensure_ssh_github(paths: &KitPaths) -> Result<(bool, bool)> {
    ensure_domain(paths, "ssh.github.com")
}
