//! Interactive access to agent containers: exec, attach, and their
//! subpath-aware variants for the multi-repo overlay.

use anyhow::Result;

use crate::application::seeding::AgentSeeder;
use crate::cli::{AttachCdArgs, ExecArgs, ExecCdArgs};
use crate::commands::CmdContext;
use crate::domain::error::ConfigError;
use crate::domain::paths::{anchor_base, anchor_home, MULTI_REPO_PROJECT};
use crate::seed::agent::discover_git_identity;
use crate::seed::scripts::AnchorConfig;

/// Seed identity and open an interactive exec running `cmd` in agent N.
pub async fn exec(ctx: &CmdContext, args: &ExecArgs) -> Result<()> {
    let project = ctx.require_project()?;
    let identity = discover_git_identity(&ctx.runner)
        .await
        .ok_or(ConfigError::MissingGitIdentity)?;

    let service = ctx.resolve_service();
    let anchor = anchor_home(project);
    let base = anchor_base(project);
    let seeder = AgentSeeder::new(&ctx.runner);
    if !ctx.no_seed {
        seeder
            .run_anchor_plan(
                &ctx.files,
                &service,
                &args.index,
                &AnchorConfig {
                    anchor: anchor.to_string(),
                    base: base.to_string(),
                    seed_codex: true,
                },
            )
            .await?;
        seeder
            .seed_ssh_material(&ctx.files, &service, &args.index, anchor)
            .await?;
    }

    let exports = format!(
        "export HOME='{anchor}' CODEX_HOME='{anchor}/.codex' \
         CODEX_ROLLOUT_DIR='{anchor}/.codex/rollouts' XDG_CACHE_HOME='{anchor}/.cache' \
         XDG_CONFIG_HOME='{anchor}/.config' DEVKIT_GIT_USER_NAME='{}' DEVKIT_GIT_USER_EMAIL='{}'",
        identity.name, identity.email
    );
    let cmd = args.cmd.join(" ");
    seeder
        .exec_interactive(
            &ctx.files,
            &service,
            &args.index,
            &format!("{exports}; exec {cmd}"),
        )
        .await
}

/// Long-lived attach to the Nth agent container.
pub async fn attach(ctx: &CmdContext, index: &str) -> Result<()> {
    ctx.require_project()?;
    let service = ctx.resolve_service();
    ctx.runner
        .compose_interactive(&ctx.files, &["attach", "--index", index, &service])
        .await
}

/// Interactive shell in agent N, `cd`'d to a subpath, with identity seeded.
pub async fn exec_cd(ctx: &CmdContext, args: &ExecCdArgs) -> Result<()> {
    let project = ctx.require_project()?;
    let dest = resolve_dest(project, &args.subpath);
    let cmd = if args.cmd.is_empty() {
        "bash".to_string()
    } else {
        args.cmd.join(" ")
    };

    let service = ctx.resolve_service();
    let anchor = anchor_home(project);
    let base = anchor_base(project);
    let seeder = AgentSeeder::new(&ctx.runner);
    if !ctx.no_seed {
        seeder
            .run_anchor_plan(
                &ctx.files,
                &service,
                &args.index,
                &AnchorConfig {
                    anchor: anchor.to_string(),
                    base: base.to_string(),
                    seed_codex: true,
                },
            )
            .await?;
        seeder
            .seed_ssh_material(&ctx.files, &service, &args.index, anchor)
            .await?;
    }
    let exports = agent_exports(anchor);
    seeder
        .exec_interactive(
            &ctx.files,
            &service,
            &args.index,
            &format!("{exports}; cd '{dest}' && exec {cmd}"),
        )
        .await
}

/// Interactive shell in agent N at a subpath without the SSH seeding pass.
pub async fn attach_cd(ctx: &CmdContext, args: &AttachCdArgs) -> Result<()> {
    let project = ctx.require_project()?;
    let dest = resolve_dest(project, &args.subpath);
    let service = ctx.resolve_service();
    let anchor = anchor_home(project);
    let base = anchor_base(project);
    let seeder = AgentSeeder::new(&ctx.runner);
    seeder
        .run_anchor_plan(
            &ctx.files,
            &service,
            &args.index,
            &AnchorConfig {
                anchor: anchor.to_string(),
                base: base.to_string(),
                seed_codex: true,
            },
        )
        .await?;
    let exports = agent_exports(anchor);
    seeder
        .exec_interactive(
            &ctx.files,
            &service,
            &args.index,
            &format!("{exports}; cd '{dest}' && exec bash"),
        )
        .await
}

fn resolve_dest(project: &str, subpath: &str) -> String {
    if subpath.starts_with('/') {
        return subpath.to_string();
    }
    let base = if project == MULTI_REPO_PROJECT {
        "/workspaces/dev"
    } else {
        "/workspace"
    };
    format!("{base}/{subpath}")
}

fn agent_exports(anchor: &str) -> String {
    format!(
        "export HOME='{anchor}' CODEX_HOME='{anchor}/.codex' \
         CODEX_ROLLOUT_DIR='{anchor}/.codex/rollouts' XDG_CACHE_HOME='{anchor}/.cache' \
         XDG_CONFIG_HOME='{anchor}/.config'"
    )
}
