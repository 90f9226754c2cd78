//! Hosts-file plumbing: the host's `/etc/hosts` (with a `sudo tee` fallback
//! on permission errors) and the same file inside agent containers.

use anyhow::{bail, Context, Result};

use crate::infra::containers::ContainerResolver;
use crate::infra::runner::Runner;

pub const DEFAULT_HOSTS_PATH: &str = "/etc/hosts";

/// Hosts file path, honoring `DEVKIT_HOSTS_FILE`.
#[must_use]
pub fn resolve_hosts_path() -> String {
    match std::env::var("DEVKIT_HOSTS_FILE") {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => DEFAULT_HOSTS_PATH.to_string(),
    }
}

/// Write the hosts file, escalating through `sudo tee` when a plain write is
/// denied.
pub async fn write_hosts_file(runner: &Runner, path: &str, content: &str) -> Result<()> {
    if runner.dry_run() {
        println!("[dry-run] would write {path}");
        return Ok(());
    }
    match std::fs::write(path, content) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {}
        Err(e) => return Err(e).with_context(|| format!("writing {path}")),
    }
    runner
        .exec_with_input("sudo", &["tee", path], content.as_bytes())
        .await
        .with_context(|| format!("writing {path} requires elevated permissions (sudo failed)"))
}

/// Read `/etc/hosts` from inside a container.
pub async fn read_container_hosts(runner: &Runner, container: &str) -> Result<String> {
    let out = runner
        .capture("docker", &["exec", container, "cat", DEFAULT_HOSTS_PATH])
        .await?;
    if !out.status.success() {
        bail!("failed reading {DEFAULT_HOSTS_PATH} from {container}");
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// Write `/etc/hosts` inside a container, as root, via stdin.
pub async fn write_container_hosts(runner: &Runner, container: &str, content: &str) -> Result<()> {
    if runner.dry_run() {
        println!("[dry-run] would update {DEFAULT_HOSTS_PATH} in {container}");
        return Ok(());
    }
    runner
        .exec_with_input(
            "docker",
            &["exec", "-i", "-u", "0", container, "sh", "-lc", "cat > /etc/hosts"],
            content.as_bytes(),
        )
        .await
        .with_context(|| format!("failed writing {DEFAULT_HOSTS_PATH} in {container}"))
}

/// IP of the overlay's ingress container, preferring its `_dev-internal`
/// network address.
pub async fn resolve_ingress_ip(runner: &Runner, file_args: &[String]) -> Result<String> {
    let resolver = ContainerResolver::new(runner);
    let names = resolver.list_compose(file_args, "ingress").await;
    let Some(name) = names.first() else {
        bail!("no running containers for service ingress");
    };
    let out = runner
        .capture(
            "docker",
            &[
                "inspect",
                "-f",
                "{{range $name, $net := .NetworkSettings.Networks}}{{printf \"%s=%s\\n\" $name $net.IPAddress}}{{end}}",
                name,
            ],
        )
        .await?;
    if !out.status.success() {
        bail!("unable to inspect ingress container {name}");
    }
    let text = String::from_utf8_lossy(&out.stdout);
    let mut fallback = String::new();
    for line in text.lines() {
        let Some((network, ip)) = line.trim().split_once('=') else {
            continue;
        };
        let ip = ip.trim();
        if ip.is_empty() {
            continue;
        }
        if network.trim().ends_with("_dev-internal") {
            return Ok(ip.to_string());
        }
        if fallback.is_empty() {
            fallback = ip.to_string();
        }
    }
    if fallback.is_empty() {
        bail!("unable to resolve ingress IP from container {name}");
    }
    Ok(fallback)
}

/// Agent containers targeted by a hosts operation: all of them, or the Nth.
pub async fn resolve_agent_containers(
    runner: &Runner,
    file_args: &[String],
    service: &str,
    index: usize,
    all: bool,
) -> Result<Vec<String>> {
    let resolver = ContainerResolver::new(runner);
    let containers = resolver.list_compose(file_args, service).await;
    if containers.is_empty() {
        bail!("no running containers for service {service}");
    }
    if all {
        return Ok(containers);
    }
    if index > containers.len() {
        bail!(
            "--index {index} out of range (found {} containers)",
            containers.len()
        );
    }
    Ok(vec![containers[index - 1].clone()])
}
