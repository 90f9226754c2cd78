//! Bootstrap: worktrees + scale + tmux in one idempotent pass, with
//! defaults from the overlay config when arguments are omitted.

use anyhow::Result;

use crate::application::seeding::AgentSeeder;
use crate::cli::BootstrapArgs;
use crate::commands::{parse_count, worktrees, CmdContext};
use crate::domain::error::UsageError;
use crate::domain::paths::{agent_home_path, agent_repo_path, MULTI_REPO_PROJECT};
use crate::infra::overlay_store;
use crate::infra::tmux;
use crate::infra::worktrees::WorktreeManager;
use crate::seed::scripts::{build_seed_scripts, update_git_exclude_script};
use crate::seed::ssh::{build_configure_scripts, build_github_config, build_write_steps, mkdir_ssh_script};

pub async fn bootstrap(ctx: &CmdContext, args: &BootstrapArgs) -> Result<()> {
    let project = ctx.require_project()?;
    if project != MULTI_REPO_PROJECT {
        return Err(
            UsageError::Message(format!("Use -p {MULTI_REPO_PROJECT} for bootstrap")).into(),
        );
    }

    let (cfg, _) = overlay_store::read_overlay(&ctx.paths.overlay_paths, project)?;
    let (repo, n) = match (&args.repo, &args.count) {
        (Some(repo), Some(count)) => (repo.clone(), parse_count(count)?),
        _ => {
            if cfg.defaults.repo.trim().is_empty() || cfg.defaults.agents < 1 {
                return Err(UsageError::Message(
                    "Usage: -p dev-all bootstrap <repo> <count> \
                     (or set defaults in overlays/dev-all/devkit.yaml)"
                        .into(),
                )
                .into());
            }
            (cfg.defaults.repo.trim().to_string(), cfg.defaults.agents as u32)
        }
    };
    let base_branch = non_empty_or(&cfg.defaults.base_branch, "main");
    let branch_prefix = non_empty_or(&cfg.defaults.branch_prefix, "agent");

    // Reset shared state so the allocated subnet applies cleanly.
    ctx.runner
        .compose(&crate::infra::compose::all_profiles_files(&ctx.paths, project), &["down"])
        .await?;
    ctx.runner
        .host_best_effort(
            "docker",
            &["rm", "-f", "devkit_envoy", "devkit_envoy_sni", "devkit_dns", "devkit_tinyproxy"],
        )
        .await;
    ctx.runner
        .host_best_effort(
            "bash",
            &["-lc", "docker ps -aq --filter name='^devkit-dev-agent-' | xargs -r docker rm -f"],
        )
        .await;
    ctx.runner
        .host_best_effort("docker", &["network", "rm", "devkit_dev-internal", "devkit_dev-egress"])
        .await;

    WorktreeManager::new(&ctx.runner)
        .setup(&ctx.paths.root, &repo, n, &base_branch, &branch_prefix)
        .await?;

    let scale = format!("dev-agent={n}");
    ctx.runner
        .compose(&ctx.files, &["up", "-d", "--remove-orphans", "--scale", &scale])
        .await?;

    if !ctx.no_seed || ctx.reseed {
        seed_agents(ctx, project, &repo, n).await?;
    }

    if tmux::skip_tmux() {
        return Ok(());
    }
    worktrees::open_worktree_windows(ctx, project, &repo, n).await
}

/// Seed Codex, git excludes, and SSH for agents 1..n of the worktree layout.
async fn seed_agents(ctx: &CmdContext, project: &str, repo: &str, n: u32) -> Result<()> {
    let seeder = AgentSeeder::new(&ctx.runner);

    for j in 1..=n {
        let idx = j.to_string();
        let home = agent_home_path(project, &idx, repo);
        for script in build_seed_scripts(&home) {
            seeder.exec_script(&ctx.files, "dev-agent", &idx, &script).await?;
        }
        let repo_path = agent_repo_path(project, &idx, repo);
        seeder
            .exec_script(
                &ctx.files,
                "dev-agent",
                &idx,
                &update_git_exclude_script(&repo_path, ".devhome-agent*"),
            )
            .await?;
    }

    // Egress must admit GitHub SSH before the validation pull below.
    let _ = crate::commands::allow::ensure_ssh_github(&ctx.paths);
    ctx.runner
        .compose(&ctx.files, &["restart", "tinyproxy", "dns"])
        .await?;

    let ssh_dir = dirs::home_dir().unwrap_or_default().join(".ssh");
    let mut host_key = ssh_dir.join("id_ed25519");
    if !host_key.exists() {
        host_key = ssh_dir.join("id_rsa");
    }
    let key_bytes = std::fs::read(&host_key).unwrap_or_default();
    let pub_bytes = std::fs::read(host_key.with_extension("pub")).unwrap_or_default();
    let known_bytes = std::fs::read(ssh_dir.join("known_hosts")).unwrap_or_default();

    for j in 1..=n {
        let idx = j.to_string();
        let home = agent_home_path(project, &idx, repo);
        let repo_path = agent_repo_path(project, &idx, repo);
        let config = build_github_config(&home, host_key.ends_with("id_ed25519"), host_key.ends_with("id_rsa"));
        seeder
            .exec_script(&ctx.files, "dev-agent", &idx, &mkdir_ssh_script(&home))
            .await?;
        for step in build_write_steps(&home, &key_bytes, &pub_bytes, &known_bytes, &config) {
            seeder
                .exec_script_input(&ctx.files, "dev-agent", &idx, &step.content, &step.script)
                .await?;
        }
        for script in build_configure_scripts(&home, &repo_path) {
            seeder.exec_script(&ctx.files, "dev-agent", &idx, &script).await?;
        }
    }
    Ok(())
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    let v = value.trim();
    if v.is_empty() {
        fallback.to_string()
    } else {
        v.to_string()
    }
}
