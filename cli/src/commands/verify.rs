//! End-to-end verification: SSH to GitHub, Codex exec, worktree status.

use anyhow::Result;

use crate::application::seeding::AgentSeeder;
use crate::commands::CmdContext;
use crate::domain::paths::{agent_home_path, agent_repo_path, AGENT_WORKTREES_DIR, MULTI_REPO_PROJECT};
use crate::infra::compose::{compose_project_env_key, default_compose_project};
use crate::infra::overlay_store;

pub async fn verify(ctx: &CmdContext) -> Result<()> {
    let project = ctx.require_project()?;
    let seeder = AgentSeeder::new(&ctx.runner);

    // 1) SSH to GitHub from agent 1.
    {
        let home = "/workspace/.devhome-agent1";
        let script = format!(
            "set -e; home=\"{home}\"; export HOME=\"$home\"; cfg=\"$home/.ssh/config\"; \
             ssh -F \"$cfg\" -T github.com -o BatchMode=yes || true"
        );
        seeder.exec_script(&ctx.files, "dev-agent", "1", &script).await?;
    }

    // 2) Codex basic exec, plus worktree status for the multi-repo overlay.
    if project == MULTI_REPO_PROJECT {
        let (cfg, _) = overlay_store::read_overlay(&ctx.paths.overlay_paths, project)?;
        let repo = if cfg.defaults.repo.trim().is_empty() {
            String::new()
        } else {
            cfg.defaults.repo.trim().to_string()
        };
        let n = if cfg.defaults.agents < 1 { 2 } else { cfg.defaults.agents as u32 };
        let scale = format!("dev-agent={n}");
        ctx.runner
            .compose(&ctx.files, &["up", "-d", "--scale", &scale])
            .await?;
        let wd = agent_repo_path(project, "1", &repo);
        let home = agent_home_path(project, "1", &repo);
        let script = format!(
            "set -e; cd '{wd}' 2>/dev/null || true; HOME='{home}' CODEX_HOME='{home}/.codex' \
             CODEX_ROLLOUT_DIR='{home}/.codex/rollouts' XDG_CACHE_HOME='{home}/.cache' \
             XDG_CONFIG_HOME='{home}/.config' codex exec 'reply with: ok' || true"
        );
        seeder.exec_script(&ctx.files, "dev-agent", "1", &script).await?;
        for i in 1..=n.min(3) {
            let idx = i.to_string();
            let path = if i == 1 {
                wd.clone()
            } else {
                format!("/workspaces/dev/{AGENT_WORKTREES_DIR}/agent{idx}/{repo}")
            };
            let script = format!(
                "cd '{path}' 2>/dev/null && git status -sb && \
                 git rev-parse --abbrev-ref --symbolic-full-name @{{u}} && \
                 git config --get push.default || true"
            );
            seeder.exec_script(&ctx.files, "dev-agent", &idx, &script).await?;
        }
    } else {
        let home = "/workspace/.devhome-agent1";
        let script = format!(
            "set -e; cd /workspace 2>/dev/null || true; HOME={home} CODEX_HOME={home}/.codex \
             CODEX_ROLLOUT_DIR={home}/.codex/rollouts XDG_CACHE_HOME={home}/.cache \
             XDG_CONFIG_HOME={home}/.config codex exec 'reply with: ok' || true"
        );
        seeder.exec_script(&ctx.files, "dev-agent", "1", &script).await?;
    }
    println!("verify completed");
    Ok(())
}

/// Run verify for every known overlay, re-invoking this executable with the
/// per-overlay compose project exported.
pub async fn verify_all(ctx: &CmdContext) -> Result<()> {
    let exe = ctx.exe.display().to_string();
    for project in ["codex", MULTI_REPO_PROJECT] {
        let compose_project = resolve_compose_project(project);
        let previous = std::env::var("COMPOSE_PROJECT_NAME").ok();
        if compose_project.is_empty() {
            std::env::remove_var("COMPOSE_PROJECT_NAME");
        } else {
            std::env::set_var("COMPOSE_PROJECT_NAME", &compose_project);
        }
        let result = ctx.runner.host(&exe, &["-p", project, "verify"]).await;
        match previous {
            Some(v) => std::env::set_var("COMPOSE_PROJECT_NAME", v),
            None => std::env::remove_var("COMPOSE_PROJECT_NAME"),
        }
        result?;
    }
    Ok(())
}

fn resolve_compose_project(project: &str) -> String {
    if let Ok(v) = std::env::var(compose_project_env_key(project)) {
        if !v.trim().is_empty() {
            return v.trim().to_string();
        }
    }
    default_compose_project(project)
}
