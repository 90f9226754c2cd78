//! Worktree commands for the multi-repo overlay.

use anyhow::Result;

use crate::application::seeding::AgentSeeder;
use crate::cli::{
    WorktreesBranchArgs, WorktreesSetupArgs, WorktreesStatusArgs, WorktreesSyncArgs,
    WorktreesTmuxArgs,
};
use crate::commands::{parse_count, CmdContext};
use crate::domain::error::UsageError;
use crate::domain::paths::{agent_repo_path, MULTI_REPO_PROJECT};
use crate::infra::tmux::{self, TmuxManager};
use crate::infra::worktrees::WorktreeManager;

fn require_multi_repo(ctx: &CmdContext, cmd: &str) -> Result<()> {
    if ctx.project.trim() != MULTI_REPO_PROJECT {
        return Err(
            UsageError::Message(format!("Use -p {MULTI_REPO_PROJECT} for {cmd}")).into(),
        );
    }
    Ok(())
}

pub fn init(ctx: &CmdContext, args: &WorktreesSetupArgs) -> Result<()> {
    ctx.require_project()?;
    println!(
        "Initialize worktrees for {}: base={} branch={} (1..{}) on host (manual)",
        args.repo, args.branch_prefix, args.base_branch, args.count
    );
    Ok(())
}

pub async fn setup(ctx: &CmdContext, args: &WorktreesSetupArgs) -> Result<()> {
    ctx.require_project()?;
    require_multi_repo(ctx, "worktrees-setup")?;
    let n = parse_count(&args.count)?;
    WorktreeManager::new(&ctx.runner)
        .setup(
            &ctx.paths.root,
            &args.repo,
            n,
            &args.base_branch,
            &args.branch_prefix,
        )
        .await
}

pub async fn branch(ctx: &CmdContext, args: &WorktreesBranchArgs) -> Result<()> {
    ctx.require_project()?;
    require_multi_repo(ctx, "worktrees-branch")?;
    let path = worktree_path(&args.index, &args.repo);
    let script = format!("set -e; cd '{path}'; git checkout -b '{}'", args.branch);
    ctx.runner
        .compose(
            &ctx.files,
            &["exec", "--index", &args.index, "dev-agent", "bash", "-lc", &script],
        )
        .await
}

pub async fn status(ctx: &CmdContext, args: &WorktreesStatusArgs) -> Result<()> {
    ctx.require_project()?;
    require_multi_repo(ctx, "worktrees-status")?;
    let seeder = AgentSeeder::new(&ctx.runner);
    match &args.index {
        Some(idx) => {
            let path = worktree_path(idx, &args.repo);
            let script = format!("set -e; cd '{path}'; git status -sb");
            seeder.exec_script(&ctx.files, "dev-agent", idx, &script).await
        }
        None => {
            for idx in ["1", "2"] {
                let path = worktree_path(idx, &args.repo);
                let script = format!("cd '{path}' 2>/dev/null && git status -sb || true");
                seeder.exec_script(&ctx.files, "dev-agent", idx, &script).await?;
            }
            Ok(())
        }
    }
}

pub async fn sync(ctx: &CmdContext, args: &WorktreesSyncArgs) -> Result<()> {
    ctx.require_project()?;
    require_multi_repo(ctx, "worktrees-sync")?;
    if !args.pull && !args.push {
        return Err(UsageError::Message(
            "Usage: worktrees-sync <repo> (--pull|--push) [--all|--index N]".into(),
        )
        .into());
    }
    let git_cmd = if args.push {
        "git push origin HEAD:main"
    } else {
        "git pull --ff-only"
    };
    let seeder = AgentSeeder::new(&ctx.runner);
    match &args.index {
        Some(idx) => {
            let path = worktree_path(idx, &args.repo);
            let script = format!("set -e; cd '{path}'; {git_cmd}");
            seeder.exec_script(&ctx.files, "dev-agent", idx, &script).await
        }
        None => {
            for idx in ["1", "2", "3", "4", "5", "6"] {
                let path = worktree_path(idx, &args.repo);
                let script =
                    format!("cd '{path}' 2>/dev/null && (set -e; cd '{path}'; {git_cmd}) || true");
                seeder.exec_script(&ctx.files, "dev-agent", idx, &script).await?;
            }
            Ok(())
        }
    }
}

pub async fn tmux(ctx: &CmdContext, args: &WorktreesTmuxArgs) -> Result<()> {
    let project = ctx.require_project()?;
    require_multi_repo(ctx, "worktrees-tmux")?;
    let n = parse_count(&args.count)?;
    let scale = format!("dev-agent={n}");
    ctx.runner
        .compose(&ctx.files, &["up", "-d", "--scale", &scale])
        .await?;
    if tmux::skip_tmux() {
        return Ok(());
    }
    open_worktree_windows(ctx, project, &args.repo, n).await
}

/// Create the `devkit-worktrees` session with one window per agent, each
/// `cd`'d into its worktree with a per-agent HOME.
pub async fn open_worktree_windows(
    ctx: &CmdContext,
    project: &str,
    repo: &str,
    n: u32,
) -> Result<()> {
    let session = "devkit-worktrees";
    let manager = TmuxManager::new(&ctx.runner);
    manager.kill_session_best_effort(session).await;
    let cmd = crate::commands::tmux::build_window_cmd(
        ctx,
        &ctx.files,
        project,
        "1",
        &agent_repo_path(project, "1", repo),
        "dev-agent",
        "",
    )
    .await?;
    manager.create_session(session, "agent-1", &cmd).await?;
    for i in 2..=n {
        let idx = i.to_string();
        let cmd = crate::commands::tmux::build_window_cmd(
            ctx,
            &ctx.files,
            project,
            &idx,
            &agent_repo_path(project, &idx, repo),
            "dev-agent",
            "",
        )
        .await?;
        manager.add_window(session, &format!("agent-{i}"), &cmd).await?;
    }
    manager.attach_session(session).await
}

fn worktree_path(idx: &str, repo: &str) -> String {
    agent_repo_path(MULTI_REPO_PROJECT, idx, repo)
}
