//! Ingress hostname management: managed blocks in the host's hosts file and
//! inside agent containers.

use anyhow::{bail, Result};

use crate::cli::HostsArgs;
use crate::commands::CmdContext;
use crate::domain::error::UsageError;
use crate::domain::hosts as hostsync;
use crate::infra::hosts as hostfs;
use crate::infra::overlay_store;

const HOST_IP: &str = "127.0.0.1";

pub async fn hosts(ctx: &CmdContext, args: &HostsArgs) -> Result<()> {
    let project = ctx.require_project()?;
    validate_args(args)?;

    let (cfg, _) = overlay_store::read_overlay(&ctx.paths.overlay_paths, project)?;
    let raw_hosts = cfg.ingress.as_ref().map(|i| i.hosts.clone()).unwrap_or_default();
    let hosts = hostsync::collect_ingress_hosts(&raw_hosts);
    if hosts.is_empty() {
        if args.require_ingress {
            bail!("overlay {project} does not define ingress.hosts");
        }
        println!("No ingress.hosts configured for overlay {project}");
        return Ok(());
    }

    let service = args
        .service
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| ctx.resolve_service());

    match args.mode.as_str() {
        "print" => print_blocks(ctx, args, project, &hosts).await,
        "apply" => apply_blocks(ctx, args, project, &hosts, &service).await,
        "check" => check_blocks(ctx, args, project, &hosts, &service).await,
        other => Err(UsageError::Message(format!("unknown hosts mode {other:?}")).into()),
    }
}

fn validate_args(args: &HostsArgs) -> Result<()> {
    if !matches!(args.mode.as_str(), "print" | "apply" | "check") {
        return Err(UsageError::Message(
            "usage: hosts [print|apply|check] [--target host|agents|all] [--index N] [--all-agents]"
                .into(),
        )
        .into());
    }
    if !matches!(args.target.as_str(), "host" | "agents" | "all") {
        return Err(UsageError::Message("--target must be host, agents, or all".into()).into());
    }
    if args.index < 1 {
        return Err(UsageError::Message("--index must be >= 1".into()).into());
    }
    Ok(())
}

fn wants_host(args: &HostsArgs) -> bool {
    args.target == "host" || args.target == "all"
}

fn wants_agents(args: &HostsArgs) -> bool {
    args.target == "agents" || args.target == "all"
}

async fn print_blocks(ctx: &CmdContext, args: &HostsArgs, project: &str, hosts: &[String]) -> Result<()> {
    if wants_host(args) {
        print!("{}", hostsync::render_block(project, HOST_IP, hosts));
    }
    if wants_agents(args) {
        let ingress_ip = hostfs::resolve_ingress_ip(&ctx.runner, &ctx.files).await?;
        print!(
            "{}",
            hostsync::render_block(&format!("{project}-agents"), &ingress_ip, hosts)
        );
    }
    Ok(())
}

async fn apply_blocks(
    ctx: &CmdContext,
    args: &HostsArgs,
    project: &str,
    hosts: &[String],
    service: &str,
) -> Result<()> {
    if wants_host(args) {
        let path = hostfs::resolve_hosts_path();
        let existing = std::fs::read_to_string(&path)?;
        let updated = hostsync::upsert_block(&existing, project, HOST_IP, hosts)?;
        if updated != existing {
            hostfs::write_hosts_file(&ctx.runner, &path, &updated).await?;
            println!("Applied host entries to {path}");
        } else {
            println!("Host entries already current in {path}");
        }
    }
    if wants_agents(args) {
        let ingress_ip = hostfs::resolve_ingress_ip(&ctx.runner, &ctx.files).await?;
        let containers = hostfs::resolve_agent_containers(
            &ctx.runner,
            &ctx.files,
            service,
            args.index,
            args.all_agents,
        )
        .await?;
        let block_project = format!("{project}-agents");
        for container in containers {
            let content = hostfs::read_container_hosts(&ctx.runner, &container).await?;
            let updated = hostsync::upsert_block(&content, &block_project, &ingress_ip, hosts)?;
            if updated == content {
                println!("Agent hosts already current in {container}");
                continue;
            }
            hostfs::write_container_hosts(&ctx.runner, &container, &updated).await?;
            println!("Applied agent entries to {container}");
        }
    }
    Ok(())
}

async fn check_blocks(
    ctx: &CmdContext,
    args: &HostsArgs,
    project: &str,
    hosts: &[String],
    service: &str,
) -> Result<()> {
    let mut failures = Vec::new();
    if wants_host(args) {
        let path = hostfs::resolve_hosts_path();
        let content = std::fs::read_to_string(&path)?;
        let missing = hostsync::missing_mappings(&content, HOST_IP, hosts);
        if !missing.is_empty() {
            failures.push(format!("host {path} missing mappings: {}", missing.join(", ")));
        }
    }
    if wants_agents(args) {
        let ingress_ip = hostfs::resolve_ingress_ip(&ctx.runner, &ctx.files).await?;
        let containers = hostfs::resolve_agent_containers(
            &ctx.runner,
            &ctx.files,
            service,
            args.index,
            args.all_agents,
        )
        .await?;
        for container in containers {
            let content = hostfs::read_container_hosts(&ctx.runner, &container).await?;
            let missing = hostsync::missing_mappings(&content, &ingress_ip, hosts);
            if !missing.is_empty() {
                failures.push(format!(
                    "agent {container} missing mappings: {}",
                    missing.join(", ")
                ));
            }
        }
    }
    if !failures.is_empty() {
        bail!("hosts check failed:\n- {}", failures.join("\n- "));
    }
    println!("Host mappings are current.");
    Ok(())
}
